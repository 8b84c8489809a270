//! Per-tile detection results.

use crate::image::{write_rows, Cell, BACKGROUND};
use crate::tile::{TileCoord, TileGrid};
use crate::util::{TileSearchError, TileSearchResult};
use std::fmt;

/// Output value of a tile that contains the marker.
pub const FOUND: Cell = 1;

/// Row-major grid holding one detection result per tile.
///
/// A nonzero cell means the marker was found inside that tile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputGrid {
    cells: Vec<Cell>,
    width: usize,
    height: usize,
}

impl OutputGrid {
    /// Allocates an all-zero grid matching `grid`'s tile layout.
    pub fn new(grid: &TileGrid) -> Self {
        Self {
            cells: vec![BACKGROUND; grid.tile_count()],
            width: grid.output_width(),
            height: grid.output_height(),
        }
    }

    /// Wraps cells read back from a device buffer.
    pub fn from_cells(grid: &TileGrid, cells: Vec<Cell>) -> TileSearchResult<Self> {
        if cells.len() != grid.tile_count() {
            return Err(TileSearchError::InvalidArgument(format!(
                "expected {} output cells, got {}",
                grid.tile_count(),
                cells.len()
            )));
        }
        Ok(Self {
            cells,
            width: grid.output_width(),
            height: grid.output_height(),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Returns the result for one tile.
    pub fn get(&self, coord: TileCoord) -> Option<Cell> {
        if coord.tx >= self.width || coord.ty >= self.height {
            return None;
        }
        self.cells.get(coord.ty * self.width + coord.tx).copied()
    }

    /// Number of tiles reporting a detection.
    pub fn hit_count(&self) -> usize {
        self.cells.iter().filter(|&&cell| cell != BACKGROUND).count()
    }

    /// Coordinates of every tile reporting a detection, row-major.
    pub fn hits(&self) -> Vec<TileCoord> {
        self.cells
            .iter()
            .enumerate()
            .filter(|&(_, &cell)| cell != BACKGROUND)
            .map(|(idx, _)| TileCoord::new(idx % self.width, idx / self.width))
            .collect()
    }
}

impl fmt::Display for OutputGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_rows(f, &self.cells, self.width)
    }
}
