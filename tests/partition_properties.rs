use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tilesearch::{Position, TileCoord, TileGrid, TileSearchError};

fn check_partition(grid: &TileGrid) {
    let mut owners = vec![0usize; grid.image_len()];
    for coord in grid.tiles() {
        let rect = grid.tile_rect(coord).unwrap();
        assert!(rect.width > 0 && rect.height > 0, "empty tile {coord:?}");
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                owners[y * grid.image_width() + x] += 1;
                assert_eq!(grid.tile_of(Position::new(x, y)), Some(coord));
            }
        }
    }
    assert!(
        owners.iter().all(|&count| count == 1),
        "cells covered other than exactly once for {grid:?}"
    );
}

#[test]
fn tiles_cover_image_exactly_once() {
    check_partition(&TileGrid::new(8, 8, 4, 4).unwrap());
    check_partition(&TileGrid::new(10, 10, 4, 4).unwrap());
    check_partition(&TileGrid::new(7, 3, 7, 3).unwrap());
    check_partition(&TileGrid::new(5, 9, 1, 2).unwrap());
    check_partition(&TileGrid::new(3, 3, 8, 8).unwrap());
}

#[test]
fn random_geometries_partition_totally() {
    let mut rng = StdRng::seed_from_u64(0x7115);
    for _ in 0..64 {
        let grid = TileGrid::new(
            rng.random_range(1..40),
            rng.random_range(1..40),
            rng.random_range(1..12),
            rng.random_range(1..12),
        )
        .unwrap();
        check_partition(&grid);
        let area: usize = grid
            .tiles()
            .map(|coord| grid.tile_rect(coord).unwrap().area())
            .sum();
        assert_eq!(area, grid.image_len());
    }
}

#[test]
fn output_size_uses_ceiling_division() {
    let grid = TileGrid::new(10, 7, 3, 7).unwrap();
    assert_eq!(grid.output_width(), 4);
    assert_eq!(grid.output_height(), 1);
    assert!(grid.has_partial_tiles());

    let exact = TileGrid::new(1024, 512, 16, 16).unwrap();
    assert_eq!((exact.output_width(), exact.output_height()), (64, 32));
    assert!(!exact.has_partial_tiles());
}

#[test]
fn edge_tile_is_truncated() {
    let grid = TileGrid::new(10, 10, 4, 4).unwrap();
    assert_eq!((grid.output_width(), grid.output_height()), (3, 3));
    let rect = grid.tile_rect(TileCoord::new(2, 2)).unwrap();
    assert_eq!((rect.x, rect.y, rect.width, rect.height), (8, 8, 2, 2));
    assert_eq!(grid.tile_of(Position::new(9, 9)), Some(TileCoord::new(2, 2)));
    assert_eq!(grid.tile_of(Position::new(10, 0)), None);
}

#[test]
fn non_positive_dimensions_rejected() {
    for (args, name, value) in [
        ((0, 8, 4, 4), "image width", 0),
        ((8, -1, 4, 4), "image height", -1),
        ((8, 8, -7, 4), "chip width", -7),
        ((8, 8, 4, 0), "chip height", 0),
    ] {
        let (iw, ih, cw, ch) = args;
        let err = TileGrid::from_signed(iw, ih, cw, ch).unwrap_err();
        assert_eq!(err, TileSearchError::InvalidDimension { name, value });
    }
}
