//! Generator Stage: produce a single-marker test image on the device.
//!
//! The clear is a bulk fill executed by the backend; the marker itself is
//! written by the `generate_image` kernel running as one work-item. The host
//! picks the position so tests can pin it through [`MarkerPlacement`].

use crate::backend::source::GENERATOR_ENTRY;
use crate::backend::{ComputeBackend, KernelArg, KernelSource};
use crate::image::{MarkerPlacement, Position, BACKGROUND};
use crate::stage::search::to_u32;
use crate::util::{TileSearchError, TileSearchResult};

/// Device-side Generator Stage for a fixed image size.
pub struct Generator<B: ComputeBackend> {
    kernel: B::Kernel,
    width: usize,
    height: usize,
    dims: [u32; 2],
}

impl<B: ComputeBackend> Generator<B> {
    /// Builds the `generate_image` kernel for a `width x height` image.
    pub fn build(
        backend: &mut B,
        source: &KernelSource,
        width: usize,
        height: usize,
    ) -> TileSearchResult<Self> {
        let dims = [to_u32("image width", width)?, to_u32("image height", height)?];
        let kernel = backend.build_kernel(source, GENERATOR_ENTRY)?;
        Ok(Self {
            kernel,
            width,
            height,
            dims,
        })
    }

    /// Enqueues clear + marker write.
    ///
    /// Returns the chosen position and the event of the marker-writing
    /// dispatch.
    pub fn enqueue<P: MarkerPlacement + ?Sized>(
        &self,
        backend: &mut B,
        image: &mut B::Buffer,
        placement: &mut P,
    ) -> TileSearchResult<(Position, B::Event)> {
        let pos = placement.place(self.width, self.height);
        if pos.x >= self.width || pos.y >= self.height {
            return Err(TileSearchError::MarkerOutOfBounds {
                x: pos.x,
                y: pos.y,
                width: self.width,
                height: self.height,
            });
        }

        backend.enqueue_fill(image, BACKGROUND)?;
        let [width, height] = self.dims;
        let event = backend.enqueue_dispatch(
            &self.kernel,
            &[
                KernelArg::Buffer(&*image),
                KernelArg::Uint(width),
                KernelArg::Uint(height),
                KernelArg::Uint(pos.x as u32),
                KernelArg::Uint(pos.y as u32),
            ],
            [1, 1],
        )?;
        Ok((pos, event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Access, CpuBackend, DeviceSelector};
    use crate::image::{FixedPlacement, Image};

    #[test]
    fn repeated_generation_leaves_one_marker() {
        let mut backend = CpuBackend::open(&DeviceSelector::default()).unwrap();
        let generator =
            Generator::build(&mut backend, &KernelSource::builtin_generator(), 6, 4).unwrap();
        let mut image = backend.alloc(24, Access::ReadWrite).unwrap();
        let mut placement = FixedPlacement::new(vec![Position::new(0, 0), Position::new(5, 3)]);
        for _ in 0..3 {
            generator.enqueue(&mut backend, &mut image, &mut placement).unwrap();
        }
        let mut cells = vec![0; 24];
        backend.read_buffer(&image, &mut cells).unwrap();
        let image = Image::from_cells(cells, 6, 4).unwrap();
        assert_eq!(image.markers(), vec![Position::new(0, 0)]);
    }

    #[test]
    fn placement_outside_image_rejected() {
        let mut backend = CpuBackend::open(&DeviceSelector::default()).unwrap();
        let generator =
            Generator::build(&mut backend, &KernelSource::builtin_generator(), 3, 3).unwrap();
        let mut image = backend.alloc(9, Access::ReadWrite).unwrap();
        let err = generator
            .enqueue(&mut backend, &mut image, &mut FixedPlacement::at(Position::new(0, 3)))
            .unwrap_err();
        assert!(matches!(err, TileSearchError::MarkerOutOfBounds { y: 3, .. }));
    }
}
