//! Tile partitioning of an image into a grid of chips.
//!
//! Tiles are laid out row-major from the top-left corner. The output grid has
//! `ceil(image / chip)` cells per axis, so when a chip size does not divide the
//! image evenly the last column and row hold truncated tiles. Each image cell
//! belongs to exactly one tile.

use crate::image::Position;
use crate::util::{TileSearchError, TileSearchResult};

/// Coordinates of a tile in the output grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub tx: usize,
    pub ty: usize,
}

impl TileCoord {
    pub fn new(tx: usize, ty: usize) -> Self {
        Self { tx, ty }
    }
}

/// In-bounds image region covered by one tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl TileRect {
    /// Returns true if `pos` falls inside this region.
    pub fn contains(&self, pos: Position) -> bool {
        pos.x >= self.x
            && pos.y >= self.y
            && pos.x < self.x + self.width
            && pos.y < self.y + self.height
    }

    /// Number of image cells covered.
    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

/// Image and chip geometry with the derived output grid size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileGrid {
    image_width: usize,
    image_height: usize,
    chip_width: usize,
    chip_height: usize,
    output_width: usize,
    output_height: usize,
}

impl TileGrid {
    /// Partitions a `image_width x image_height` image into
    /// `chip_width x chip_height` tiles.
    ///
    /// Returns [`TileSearchError::InvalidDimension`] if any input is zero and
    /// [`TileSearchError::InvalidArgument`] if the cell count overflows.
    pub fn new(
        image_width: usize,
        image_height: usize,
        chip_width: usize,
        chip_height: usize,
    ) -> TileSearchResult<Self> {
        for (name, value) in [
            ("image width", image_width),
            ("image height", image_height),
            ("chip width", chip_width),
            ("chip height", chip_height),
        ] {
            if value == 0 {
                return Err(TileSearchError::InvalidDimension { name, value: 0 });
            }
        }
        // Tile count never exceeds the cell count, so this bounds both.
        if image_width.checked_mul(image_height).is_none() {
            return Err(TileSearchError::InvalidArgument(format!(
                "{image_width}x{image_height} image overflows usize"
            )));
        }

        Ok(Self {
            image_width,
            image_height,
            chip_width,
            chip_height,
            output_width: image_width.div_ceil(chip_width),
            output_height: image_height.div_ceil(chip_height),
        })
    }

    /// Builds a grid from signed inputs as they arrive from a command line.
    pub fn from_signed(
        image_width: i64,
        image_height: i64,
        chip_width: i64,
        chip_height: i64,
    ) -> TileSearchResult<Self> {
        Self::new(
            positive("image width", image_width)?,
            positive("image height", image_height)?,
            positive("chip width", chip_width)?,
            positive("chip height", chip_height)?,
        )
    }

    pub fn image_width(&self) -> usize {
        self.image_width
    }

    pub fn image_height(&self) -> usize {
        self.image_height
    }

    pub fn chip_width(&self) -> usize {
        self.chip_width
    }

    pub fn chip_height(&self) -> usize {
        self.chip_height
    }

    /// Tiles per row of the output grid.
    pub fn output_width(&self) -> usize {
        self.output_width
    }

    /// Tiles per column of the output grid.
    pub fn output_height(&self) -> usize {
        self.output_height
    }

    /// Number of image cells.
    pub fn image_len(&self) -> usize {
        self.image_width * self.image_height
    }

    /// Number of tiles (and output cells).
    pub fn tile_count(&self) -> usize {
        self.output_width * self.output_height
    }

    /// Returns true if either chip dimension leaves a partial edge tile.
    pub fn has_partial_tiles(&self) -> bool {
        self.image_width % self.chip_width != 0 || self.image_height % self.chip_height != 0
    }

    /// Returns true if `pos` lies inside the image.
    pub fn contains(&self, pos: Position) -> bool {
        pos.x < self.image_width && pos.y < self.image_height
    }

    /// Returns the tile owning the image cell at `pos`.
    pub fn tile_of(&self, pos: Position) -> Option<TileCoord> {
        if !self.contains(pos) {
            return None;
        }
        Some(TileCoord::new(pos.x / self.chip_width, pos.y / self.chip_height))
    }

    /// Returns the in-bounds region of a tile, truncated at the image edges.
    pub fn tile_rect(&self, coord: TileCoord) -> Option<TileRect> {
        if coord.tx >= self.output_width || coord.ty >= self.output_height {
            return None;
        }
        let x = coord.tx * self.chip_width;
        let y = coord.ty * self.chip_height;
        Some(TileRect {
            x,
            y,
            width: self.chip_width.min(self.image_width - x),
            height: self.chip_height.min(self.image_height - y),
        })
    }

    /// Row-major index of a tile in the output grid.
    pub fn output_index(&self, coord: TileCoord) -> Option<usize> {
        if coord.tx >= self.output_width || coord.ty >= self.output_height {
            return None;
        }
        Some(coord.ty * self.output_width + coord.tx)
    }

    /// Iterates over all tile coordinates in row-major order.
    pub fn tiles(&self) -> impl Iterator<Item = TileCoord> + '_ {
        (0..self.output_height)
            .flat_map(move |ty| (0..self.output_width).map(move |tx| TileCoord::new(tx, ty)))
    }
}

fn positive(name: &'static str, value: i64) -> TileSearchResult<usize> {
    if value <= 0 {
        return Err(TileSearchError::InvalidDimension { name, value });
    }
    usize::try_from(value).map_err(|_| TileSearchError::InvalidDimension { name, value })
}
