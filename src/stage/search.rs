//! Search Stage: per-tile marker detection.
//!
//! Each tile is evaluated independently and writes only its own output cell,
//! so tiles run in parallel with no locks or atomics. Edge tiles scan only the
//! in-bounds part of their region.

use crate::backend::source::SEARCH_ENTRY;
use crate::backend::{ComputeBackend, KernelArg, KernelSource};
use crate::image::{Cell, ImageView, BACKGROUND, MARKER};
use crate::output::{OutputGrid, FOUND};
use crate::tile::{TileCoord, TileGrid, TileRect};
use crate::util::{TileSearchError, TileSearchResult};
use rayon::prelude::*;

/// Returns [`FOUND`] if any in-bounds cell of `rect` holds the marker.
pub fn evaluate_tile(image: ImageView<'_, Cell>, rect: TileRect) -> Cell {
    let Some(tile) = image.roi_clipped(rect.x, rect.y, rect.width, rect.height) else {
        return BACKGROUND;
    };
    let hit = (0..tile.height())
        .filter_map(|y| tile.row(y))
        .any(|row| row.contains(&MARKER));
    if hit {
        FOUND
    } else {
        BACKGROUND
    }
}

/// Searches every tile of `image` on the rayon pool.
pub fn search_image(image: ImageView<'_, Cell>, grid: &TileGrid) -> TileSearchResult<OutputGrid> {
    if image.width() != grid.image_width() || image.height() != grid.image_height() {
        return Err(TileSearchError::InvalidArgument(format!(
            "image is {}x{} but the tile grid expects {}x{}",
            image.width(),
            image.height(),
            grid.image_width(),
            grid.image_height()
        )));
    }
    let mut out = OutputGrid::new(grid);
    search_domain(image, grid, out.cells_mut(), grid.output_width());
    Ok(out)
}

/// Evaluates one tile per output cell.
///
/// `out` is addressed as a row-major grid `domain_width` cells wide; cells
/// whose tile lies outside `grid` are cleared.
pub(crate) fn search_domain(
    image: ImageView<'_, Cell>,
    grid: &TileGrid,
    out: &mut [Cell],
    domain_width: usize,
) {
    if domain_width == 0 {
        return;
    }
    out.par_iter_mut().enumerate().for_each(|(idx, cell)| {
        let coord = TileCoord::new(idx % domain_width, idx / domain_width);
        *cell = grid
            .tile_rect(coord)
            .map_or(BACKGROUND, |rect| evaluate_tile(image, rect));
    });
}

/// Device-side Search Stage bound to one tile geometry.
pub struct Search<B: ComputeBackend> {
    kernel: B::Kernel,
    grid: TileGrid,
    dims: [u32; 4],
}

impl<B: ComputeBackend> Search<B> {
    /// Builds the `find_image` kernel for `grid`.
    pub fn build(backend: &mut B, source: &KernelSource, grid: TileGrid) -> TileSearchResult<Self> {
        let dims = [
            to_u32("image width", grid.image_width())?,
            to_u32("image height", grid.image_height())?,
            to_u32("chip width", grid.chip_width())?,
            to_u32("chip height", grid.chip_height())?,
        ];
        let kernel = backend.build_kernel(source, SEARCH_ENTRY)?;
        Ok(Self { kernel, grid, dims })
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// Enqueues one evaluation of every tile, one work-item per tile.
    pub fn enqueue(
        &self,
        backend: &mut B,
        image: &B::Buffer,
        output: &B::Buffer,
    ) -> TileSearchResult<B::Event> {
        let [width, height, chip_width, chip_height] = self.dims;
        backend.enqueue_dispatch(
            &self.kernel,
            &[
                KernelArg::Buffer(image),
                KernelArg::Uint(width),
                KernelArg::Uint(height),
                KernelArg::Uint(chip_width),
                KernelArg::Uint(chip_height),
                KernelArg::Buffer(output),
            ],
            [self.grid.output_width(), self.grid.output_height()],
        )
    }
}

pub(crate) fn to_u32(name: &'static str, value: usize) -> TileSearchResult<u32> {
    u32::try_from(value).map_err(|_| {
        TileSearchError::InvalidArgument(format!("{name} {value} exceeds the device limit"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{Image, Position};

    #[test]
    fn evaluate_tile_ignores_neighbours() {
        let mut image = Image::new(8, 8).unwrap();
        image.set_marker(Position::new(4, 0)).unwrap();
        let left = TileRect {
            x: 0,
            y: 0,
            width: 4,
            height: 4,
        };
        let right = TileRect { x: 4, ..left };
        assert_eq!(evaluate_tile(image.view(), left), BACKGROUND);
        assert_eq!(evaluate_tile(image.view(), right), FOUND);
    }

    #[test]
    fn search_rejects_mismatched_grid() {
        let image = Image::new(8, 8).unwrap();
        let grid = TileGrid::new(8, 9, 4, 4).unwrap();
        assert!(search_image(image.view(), &grid).is_err());
    }

    #[test]
    fn wider_domain_clears_extra_cells() {
        let mut image = Image::new(4, 4).unwrap();
        image.set_marker(Position::new(3, 3)).unwrap();
        let grid = TileGrid::new(4, 4, 2, 2).unwrap();
        let mut out = vec![7; 9];
        search_domain(image.view(), &grid, &mut out, 3);
        assert_eq!(out, vec![0, 0, 0, 0, 1, 0, 0, 0, 0]);
    }
}
