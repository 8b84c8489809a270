//! Backend status codes.
//!
//! Values follow the OpenCL numbering so diagnostics read the same whichever
//! backend produced them.

pub const DEVICE_NOT_FOUND: i32 = -1;
pub const MEM_OBJECT_ALLOCATION_FAILURE: i32 = -4;
pub const OUT_OF_RESOURCES: i32 = -5;
pub const PROFILING_INFO_NOT_AVAILABLE: i32 = -7;
pub const INVALID_VALUE: i32 = -30;
pub const INVALID_MEM_OBJECT: i32 = -38;
pub const INVALID_KERNEL_ARGS: i32 = -52;
pub const INVALID_OPERATION: i32 = -59;
pub const INVALID_BUFFER_SIZE: i32 = -61;
pub const INVALID_GLOBAL_WORK_SIZE: i32 = -63;
