//! Device stages enqueued by the timing harness.
//!
//! Each stage also has a host reference form (`Image::generate`,
//! [`search::search_image`]) that shares the per-tile contract with the
//! CPU device.

pub mod generator;
pub mod search;

pub use generator::Generator;
pub use search::{evaluate_tile, search_image, Search};
