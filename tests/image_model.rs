use tilesearch::{
    FixedPlacement, Image, MarkerPlacement, Position, RandomPlacement, TileSearchError,
    BACKGROUND, MARKER,
};

#[test]
fn generation_leaves_exactly_one_marker() {
    let mut image = Image::new(13, 9).unwrap();
    let mut placement = RandomPlacement::seeded(42);
    for _ in 0..200 {
        let pos = image.generate(&mut placement).unwrap();
        assert!(image.contains(pos));
        assert_eq!(image.markers(), vec![pos]);
        let background = image.cells().iter().filter(|&&c| c == BACKGROUND).count();
        assert_eq!(background, 13 * 9 - 1);
    }
}

#[test]
fn seeded_placement_is_reproducible_and_covers_image() {
    let mut a = RandomPlacement::seeded(7);
    let mut b = RandomPlacement::seeded(7);
    let mut seen = vec![false; 4 * 3];
    for _ in 0..500 {
        let pos = a.place(4, 3);
        assert_eq!(pos, b.place(4, 3));
        assert!(pos.x < 4 && pos.y < 3);
        seen[pos.y * 4 + pos.x] = true;
    }
    assert!(seen.iter().all(|&hit| hit), "some cells never chosen");
}

#[test]
fn fixed_placement_outside_image_fails_generation() {
    let mut image = Image::new(4, 4).unwrap();
    let err = image
        .generate(&mut FixedPlacement::at(Position::new(2, 4)))
        .unwrap_err();
    assert_eq!(
        err,
        TileSearchError::MarkerOutOfBounds {
            x: 2,
            y: 4,
            width: 4,
            height: 4
        }
    );
}

#[test]
fn from_cells_checks_length_and_keeps_markers() {
    let mut cells = vec![BACKGROUND; 6];
    cells[4] = MARKER;
    let image = Image::from_cells(cells, 3, 2).unwrap();
    assert_eq!(image.markers(), vec![Position::new(1, 1)]);
    assert!(Image::from_cells(vec![BACKGROUND; 5], 3, 2).is_err());
}
