//! Detection self-test on the device.

use crate::backend::{Access, ComputeBackend};
use crate::harness::config::HarnessConfig;
use crate::image::{Position, BACKGROUND, MARKER};
use crate::output::OutputGrid;
use crate::stage::Search;
use crate::tile::TileCoord;
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{TileSearchError, TileSearchResult};

/// A marker position whose search result was not exactly its own tile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Misdetection {
    pub marker: Position,
    pub expected: TileCoord,
    pub found: Vec<TileCoord>,
}

/// Outcome of [`verify_detection`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub positions_checked: usize,
    pub failures: Vec<Misdetection>,
}

impl VerifyReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Every cell of the configured image, row-major.
pub fn all_positions(config: &HarnessConfig) -> impl Iterator<Item = Position> {
    let width = config.grid.image_width();
    let height = config.grid.image_height();
    (0..height).flat_map(move |y| (0..width).map(move |x| Position::new(x, y)))
}

/// Places the marker at each of `positions` on the device, runs the search
/// kernel and checks that exactly the owning tile reports it.
pub fn verify_detection<B, I>(config: &HarnessConfig, positions: I) -> TileSearchResult<VerifyReport>
where
    B: ComputeBackend,
    I: IntoIterator<Item = Position>,
{
    config.validate()?;
    let _span = trace_span!("verify_detection").entered();
    let grid = config.grid;
    let (_, search_src) = config.kernels.load()?;

    let mut backend = B::open(&config.device)?;
    let search = Search::build(&mut backend, &search_src, grid)?;
    let mut image = backend.alloc(grid.image_len(), Access::ReadWrite)?;
    let output = backend.alloc(grid.tile_count(), Access::WriteOnly)?;
    let mut cells = vec![BACKGROUND; grid.tile_count()];

    let mut report = VerifyReport::default();
    for marker in positions {
        let expected = grid
            .tile_of(marker)
            .ok_or(TileSearchError::MarkerOutOfBounds {
                x: marker.x,
                y: marker.y,
                width: grid.image_width(),
                height: grid.image_height(),
            })?;
        backend.enqueue_fill(&mut image, BACKGROUND)?;
        backend.enqueue_write_point(&mut image, marker.y * grid.image_width() + marker.x, MARKER)?;
        search.enqueue(&mut backend, &image, &output)?;
        backend.read_buffer(&output, &mut cells)?;

        let found = OutputGrid::from_cells(&grid, cells.clone())?.hits();
        report.positions_checked += 1;
        if found != [expected] {
            trace_warn!("misdetection", x = marker.x, y = marker.y, hits = found.len());
            report.failures.push(Misdetection {
                marker,
                expected,
                found,
            });
        }
    }

    trace_event!(
        "verified",
        checked = report.positions_checked,
        failures = report.failures.len()
    );
    Ok(report)
}
