//! Image model: cell values, borrowed views and the owned search surface.
//!
//! `ImageView` is a borrowed 2D view into a 1D buffer with an explicit stride.
//! The stride counts elements between the starts of consecutive rows. ROI
//! slices are zero-copy views into the same backing slice and keep the
//! original stride, which is how a tile is carved out of the image.

use crate::util::{TileSearchError, TileSearchResult};
use std::fmt;

pub mod placement;

pub use placement::{FixedPlacement, MarkerPlacement, RandomPlacement};

/// Value stored in one image or output cell.
pub type Cell = u32;

/// Value of every cell that is not the target.
pub const BACKGROUND: Cell = 0;

/// Value of the single target cell.
pub const MARKER: Cell = 1;

/// Cell coordinates in image space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Position {
    /// Column.
    pub x: usize,
    /// Row.
    pub y: usize,
}

impl Position {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone, Debug)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> TileSearchResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> TileSearchResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(TileSearchError::InvalidArgument(format!(
                "buffer of {} cells is smaller than the {needed} a {width}x{height} view needs",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Returns the image width in cells.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in cells.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y.checked_mul(self.stride)?.checked_add(x)?;
        self.data.get(idx)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y.checked_mul(self.stride)?;
        let end = start.checked_add(self.width)?;
        self.data.get(start..end)
    }

    /// Returns a zero-copy ROI view, clipped to the image bounds.
    ///
    /// The origin must lie inside the image; a region hanging over the right
    /// or bottom edge is truncated rather than rejected, which is exactly the
    /// shape of a partial edge tile.
    pub fn roi_clipped(
        &self,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    ) -> Option<ImageView<'a, T>> {
        if width == 0 || height == 0 || x >= self.width || y >= self.height {
            return None;
        }
        let width = width.min(self.width - x);
        let height = height.min(self.height - y);
        let start = y.checked_mul(self.stride)?.checked_add(x)?;
        let data = self.data.get(start..)?;
        ImageView::new(data, width, height, self.stride).ok()
    }
}

fn required_len(width: usize, height: usize, stride: usize) -> TileSearchResult<usize> {
    if width == 0 {
        return Err(TileSearchError::InvalidDimension {
            name: "image width",
            value: 0,
        });
    }
    if height == 0 {
        return Err(TileSearchError::InvalidDimension {
            name: "image height",
            value: 0,
        });
    }
    if stride < width {
        return Err(TileSearchError::InvalidArgument(format!(
            "stride {stride} is smaller than width {width}"
        )));
    }
    (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or_else(|| {
            TileSearchError::InvalidArgument(format!("{width}x{height} image overflows usize"))
        })
}

/// Owned, heap-allocated search surface.
///
/// Holds `width * height` cells in row-major order. A freshly created image is
/// all background; [`Image::generate`] establishes the single-marker state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    cells: Vec<Cell>,
    width: usize,
    height: usize,
}

impl Image {
    /// Allocates an all-background image.
    pub fn new(width: usize, height: usize) -> TileSearchResult<Self> {
        let len = required_len(width, height, width)?;
        Ok(Self {
            cells: vec![BACKGROUND; len],
            width,
            height,
        })
    }

    /// Wraps existing cells, e.g. a buffer read back from a device.
    pub fn from_cells(cells: Vec<Cell>, width: usize, height: usize) -> TileSearchResult<Self> {
        let len = required_len(width, height, width)?;
        if cells.len() != len {
            return Err(TileSearchError::InvalidArgument(format!(
                "expected {len} cells for a {width}x{height} image, got {}",
                cells.len()
            )));
        }
        Ok(Self {
            cells,
            width,
            height,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the cells in row-major order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Returns a borrowed view of the whole image.
    pub fn view(&self) -> ImageView<'_, Cell> {
        ImageView {
            data: &self.cells,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }

    /// Returns true if `pos` lies inside the image.
    pub fn contains(&self, pos: Position) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    /// Resets every cell to [`BACKGROUND`].
    pub fn clear(&mut self) {
        self.cells.fill(BACKGROUND);
    }

    /// Writes [`MARKER`] at `pos` without touching other cells.
    pub fn set_marker(&mut self, pos: Position) -> TileSearchResult<()> {
        self.check_bounds(pos)?;
        self.cells[pos.y * self.width + pos.x] = MARKER;
        Ok(())
    }

    fn check_bounds(&self, pos: Position) -> TileSearchResult<()> {
        if self.contains(pos) {
            return Ok(());
        }
        Err(TileSearchError::MarkerOutOfBounds {
            x: pos.x,
            y: pos.y,
            width: self.width,
            height: self.height,
        })
    }

    /// Clears the image and places exactly one marker chosen by `placement`.
    ///
    /// A rejected placement leaves the image untouched.
    pub fn generate<P: MarkerPlacement + ?Sized>(
        &mut self,
        placement: &mut P,
    ) -> TileSearchResult<Position> {
        let pos = placement.place(self.width, self.height);
        self.check_bounds(pos)?;
        self.clear();
        self.set_marker(pos)?;
        Ok(pos)
    }

    /// Returns the positions of all marker cells in row-major order.
    pub fn markers(&self) -> Vec<Position> {
        self.cells
            .iter()
            .enumerate()
            .filter(|&(_, &cell)| cell == MARKER)
            .map(|(idx, _)| Position::new(idx % self.width, idx / self.width))
            .collect()
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_rows(f, &self.cells, self.width)
    }
}

/// Writes a row-major grid as space-separated rows.
pub(crate) fn write_rows(f: &mut fmt::Formatter<'_>, cells: &[Cell], width: usize) -> fmt::Result {
    for row in cells.chunks(width) {
        for cell in row {
            write!(f, "{cell} ")?;
        }
        writeln!(f)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roi_clips_at_right_and_bottom_edges() {
        let data: Vec<u32> = (0..100).collect();
        let view = ImageView::from_slice(&data, 10, 10).unwrap();

        let tile = view.roi_clipped(8, 8, 4, 4).unwrap();
        assert_eq!((tile.width(), tile.height()), (2, 2));
        assert_eq!(tile.stride(), 10);
        assert_eq!(tile.row(0).unwrap(), &[88, 89]);
        assert_eq!(tile.row(1).unwrap(), &[98, 99]);
        assert!(tile.get(2, 0).is_none());

        assert!(view.roi_clipped(10, 0, 4, 4).is_none());
        assert!(view.roi_clipped(0, 0, 0, 4).is_none());
    }

    #[test]
    fn set_marker_rejects_out_of_bounds() {
        let mut image = Image::new(4, 3).unwrap();
        let err = image.set_marker(Position::new(4, 0)).unwrap_err();
        assert_eq!(
            err,
            TileSearchError::MarkerOutOfBounds {
                x: 4,
                y: 0,
                width: 4,
                height: 3,
            }
        );
    }

    #[test]
    fn rejected_generation_keeps_previous_marker() {
        let mut image = Image::new(4, 4).unwrap();
        image.set_marker(Position::new(1, 1)).unwrap();
        let err = image
            .generate(&mut FixedPlacement::at(Position::new(9, 9)))
            .unwrap_err();
        assert!(matches!(err, TileSearchError::MarkerOutOfBounds { x: 9, y: 9, .. }));
        assert_eq!(image.markers(), vec![Position::new(1, 1)]);
    }

    #[test]
    fn display_renders_rows() {
        let mut image = Image::new(3, 2).unwrap();
        image.set_marker(Position::new(1, 1)).unwrap();
        assert_eq!(image.to_string(), "0 0 0 \n0 1 0 \n");
    }
}
