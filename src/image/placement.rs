//! Marker placement strategies.
//!
//! Production runs draw positions from an entropy-seeded generator; tests
//! inject a seeded generator or a fixed list of positions.

use crate::image::Position;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of marker positions for the Generator Stage.
pub trait MarkerPlacement {
    /// Chooses the next marker position for a `width x height` image.
    ///
    /// Implementations are expected to return an in-bounds position; callers
    /// still validate it before writing.
    fn place(&mut self, width: usize, height: usize) -> Position;
}

/// Uniformly random placement over the whole image.
#[derive(Clone, Debug)]
pub struct RandomPlacement<R> {
    rng: R,
}

impl<R: Rng> RandomPlacement<R> {
    /// Wraps any random number generator.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RandomPlacement<StdRng> {
    /// Seeds from operating-system entropy.
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_os_rng())
    }

    /// Deterministic placement for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> MarkerPlacement for RandomPlacement<R> {
    fn place(&mut self, width: usize, height: usize) -> Position {
        let x = self.rng.random_range(0..width);
        let y = self.rng.random_range(0..height);
        Position::new(x, y)
    }
}

/// Cycles through a fixed list of positions.
#[derive(Clone, Debug)]
pub struct FixedPlacement {
    positions: Vec<Position>,
    next: usize,
}

impl FixedPlacement {
    /// Creates a placement that repeats `positions` in order.
    ///
    /// An empty list always yields the origin.
    pub fn new(positions: Vec<Position>) -> Self {
        Self { positions, next: 0 }
    }

    /// Always places the marker at `pos`.
    pub fn at(pos: Position) -> Self {
        Self::new(vec![pos])
    }
}

impl MarkerPlacement for FixedPlacement {
    fn place(&mut self, _width: usize, _height: usize) -> Position {
        if self.positions.is_empty() {
            return Position::new(0, 0);
        }
        let pos = self.positions[self.next % self.positions.len()];
        self.next = self.next.wrapping_add(1);
        pos
    }
}

impl<P: MarkerPlacement + ?Sized> MarkerPlacement for &mut P {
    fn place(&mut self, width: usize, height: usize) -> Position {
        (**self).place(width, height)
    }
}
