//! Native implementations of the device kernels for the CPU backend.
//!
//! A kernel is bound from its `__kernel` entry name. Arguments are checked
//! against the OpenCL signature at enqueue time, the same point at which an
//! OpenCL runtime rejects bad arguments.

use crate::backend::cpu::CpuBuffer;
use crate::backend::source::{GENERATOR_ENTRY, SEARCH_ENTRY};
use crate::backend::status;
use crate::image::{ImageView, MARKER};
use crate::stage::search::search_domain;
use crate::tile::TileGrid;
use std::sync::{Arc, PoisonError};

/// Kernels the CPU device can execute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NativeKernel {
    GenerateImage,
    FindImage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ArgKind {
    Buffer,
    Uint,
}

/// Argument captured at enqueue time.
#[derive(Clone, Debug)]
pub(crate) enum BoundArg {
    Buffer(CpuBuffer),
    Uint(u32),
}

/// Fully type-checked kernel invocation.
#[derive(Debug)]
pub(crate) enum Launch {
    Generate {
        image: CpuBuffer,
        width: usize,
        height: usize,
        x: usize,
        y: usize,
    },
    Find {
        image: CpuBuffer,
        width: usize,
        height: usize,
        chip_width: usize,
        chip_height: usize,
        output: CpuBuffer,
        global: [usize; 2],
    },
}

impl NativeKernel {
    pub(crate) fn lookup(entry: &str) -> Option<Self> {
        match entry {
            GENERATOR_ENTRY => Some(Self::GenerateImage),
            SEARCH_ENTRY => Some(Self::FindImage),
            _ => None,
        }
    }

    fn signature(self) -> &'static [ArgKind] {
        use ArgKind::{Buffer, Uint};
        match self {
            Self::GenerateImage => &[Buffer, Uint, Uint, Uint, Uint],
            Self::FindImage => &[Buffer, Uint, Uint, Uint, Uint, Buffer],
        }
    }

    pub(crate) fn arity(self) -> usize {
        self.signature().len()
    }

    /// Checks `args` against the signature and produces a launch.
    pub(crate) fn bind(self, args: Vec<BoundArg>, global: [usize; 2]) -> Result<Launch, i32> {
        let kinds_match = args.len() == self.arity()
            && args.iter().zip(self.signature()).all(|(arg, kind)| {
                matches!(
                    (arg, kind),
                    (BoundArg::Buffer(_), ArgKind::Buffer) | (BoundArg::Uint(_), ArgKind::Uint)
                )
            });
        if !kinds_match {
            return Err(status::INVALID_KERNEL_ARGS);
        }
        if global[0] == 0 || global[1] == 0 {
            return Err(status::INVALID_GLOBAL_WORK_SIZE);
        }

        let mut buffers = Vec::new();
        let mut uints = Vec::new();
        for arg in args {
            match arg {
                BoundArg::Buffer(buffer) => buffers.push(buffer),
                BoundArg::Uint(value) => uints.push(value as usize),
            }
        }

        match self {
            Self::GenerateImage => {
                let image = buffers.pop().ok_or(status::INVALID_KERNEL_ARGS)?;
                if !image.access().kernel_can_write() {
                    return Err(status::INVALID_MEM_OBJECT);
                }
                Ok(Launch::Generate {
                    image,
                    width: uints[0],
                    height: uints[1],
                    x: uints[2],
                    y: uints[3],
                })
            }
            Self::FindImage => {
                let output = buffers.pop().ok_or(status::INVALID_KERNEL_ARGS)?;
                let image = buffers.pop().ok_or(status::INVALID_KERNEL_ARGS)?;
                if !image.access().kernel_can_read() || !output.access().kernel_can_write() {
                    return Err(status::INVALID_MEM_OBJECT);
                }
                if image.same_storage(&output) {
                    return Err(status::INVALID_MEM_OBJECT);
                }
                Ok(Launch::Find {
                    image,
                    width: uints[0],
                    height: uints[1],
                    chip_width: uints[2],
                    chip_height: uints[3],
                    output,
                    global,
                })
            }
        }
    }
}

impl Launch {
    /// Runs the kernel body on the current rayon pool.
    pub(crate) fn execute(self) -> Result<(), i32> {
        match self {
            Launch::Generate {
                image,
                width,
                height,
                x,
                y,
            } => {
                let mut cells = image
                    .storage()
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                let len = width.checked_mul(height).ok_or(status::INVALID_VALUE)?;
                if cells.len() < len {
                    return Err(status::INVALID_BUFFER_SIZE);
                }
                if x < width && y < height {
                    cells[y * width + x] = MARKER;
                }
                Ok(())
            }
            Launch::Find {
                image,
                width,
                height,
                chip_width,
                chip_height,
                output,
                global,
            } => {
                let grid = TileGrid::new(width, height, chip_width, chip_height)
                    .map_err(|_| status::INVALID_VALUE)?;
                let domain = global[0]
                    .checked_mul(global[1])
                    .ok_or(status::INVALID_GLOBAL_WORK_SIZE)?;

                let cells = image.storage().read().unwrap_or_else(PoisonError::into_inner);
                let mut out = output
                    .storage()
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                if cells.len() < grid.image_len() || out.len() < domain {
                    return Err(status::INVALID_BUFFER_SIZE);
                }
                let view = ImageView::from_slice(&cells[..grid.image_len()], width, height)
                    .map_err(|_| status::INVALID_VALUE)?;
                search_domain(view, &grid, &mut out[..domain], global[0]);
                Ok(())
            }
        }
    }
}

impl CpuBuffer {
    fn same_storage(&self, other: &CpuBuffer) -> bool {
        Arc::ptr_eq(self.storage(), other.storage())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Access;

    #[test]
    fn lookup_knows_both_entries() {
        assert_eq!(
            NativeKernel::lookup("generate_image"),
            Some(NativeKernel::GenerateImage)
        );
        assert_eq!(NativeKernel::lookup("find_image"), Some(NativeKernel::FindImage));
        assert_eq!(NativeKernel::lookup("find_images"), None);
    }

    #[test]
    fn bind_rejects_wrong_argument_kinds() {
        let buf = CpuBuffer::zeroed(4, Access::ReadWrite).unwrap();
        let args = vec![
            BoundArg::Uint(2),
            BoundArg::Buffer(buf),
            BoundArg::Uint(2),
            BoundArg::Uint(0),
            BoundArg::Uint(0),
        ];
        let err = NativeKernel::GenerateImage.bind(args, [1, 1]).unwrap_err();
        assert_eq!(err, status::INVALID_KERNEL_ARGS);
    }

    #[test]
    fn bind_rejects_aliased_search_buffers() {
        let buf = CpuBuffer::zeroed(16, Access::ReadWrite).unwrap();
        let args = vec![
            BoundArg::Buffer(buf.clone()),
            BoundArg::Uint(4),
            BoundArg::Uint(4),
            BoundArg::Uint(2),
            BoundArg::Uint(2),
            BoundArg::Buffer(buf),
        ];
        let err = NativeKernel::FindImage.bind(args, [2, 2]).unwrap_err();
        assert_eq!(err, status::INVALID_MEM_OBJECT);
    }

    #[test]
    fn find_writes_only_owning_tile() {
        let image = CpuBuffer::zeroed(100, Access::ReadWrite).unwrap();
        let output = CpuBuffer::zeroed(9, Access::WriteOnly).unwrap();
        image.storage().write().unwrap()[99] = MARKER;
        let args = vec![
            BoundArg::Buffer(image),
            BoundArg::Uint(10),
            BoundArg::Uint(10),
            BoundArg::Uint(4),
            BoundArg::Uint(4),
            BoundArg::Buffer(output.clone()),
        ];
        NativeKernel::FindImage
            .bind(args, [3, 3])
            .unwrap()
            .execute()
            .unwrap();
        let out = output.storage().read().unwrap().clone();
        assert_eq!(out, vec![0, 0, 0, 0, 0, 0, 0, 0, 1]);
    }
}
