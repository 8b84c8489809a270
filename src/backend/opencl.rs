//! OpenCL device backend.
//!
//! One context and one in-order, profiling-enabled command queue on the
//! selected device. The barrier gate is a user event: the barrier waits on
//! it, so nothing enqueued afterwards starts until the host sets it complete.

use crate::backend::{
    status, Access, ComputeBackend, DeviceInfo, DeviceKind, DeviceSelector, EventTimes, KernelArg,
    KernelSource,
};
use crate::image::Cell;
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{TileSearchError, TileSearchResult};
use opencl3::command_queue::{CommandQueue, CL_QUEUE_PROFILING_ENABLE};
use opencl3::context::Context;
use opencl3::device::{
    get_all_devices, Device, CL_DEVICE_TYPE_ACCELERATOR, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_CPU,
    CL_DEVICE_TYPE_GPU,
};
use opencl3::error_codes::ClError;
use opencl3::event::{Event, CL_COMPLETE};
use opencl3::kernel::{ExecuteKernel, Kernel};
use opencl3::memory::{Buffer, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE, CL_MEM_WRITE_ONLY};
use opencl3::program::Program;
use opencl3::types::{cl_device_type, cl_uint, CL_BLOCKING};
use std::mem;
use std::ptr;

/// Device buffer of cells.
pub struct OpenClBuffer {
    inner: Buffer<cl_uint>,
    len: usize,
}

impl OpenClBuffer {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A kernel built for the opened device.
pub struct OpenClKernel {
    entry: String,
    // Kernel objects reference their program; keep it alive alongside.
    inner: Kernel,
    _program: Program,
}

impl OpenClKernel {
    pub fn entry(&self) -> &str {
        &self.entry
    }
}

/// User event holding a barrier closed.
pub struct OpenClGate {
    event: Event,
    open: bool,
}

impl OpenClGate {
    fn open(&mut self) -> Result<(), ClError> {
        if !self.open {
            #[allow(unused_unsafe)]
            unsafe {
                cl3::event::set_user_event_status(self.event.get(), CL_COMPLETE)
                    .map_err(ClError)?;
            }
            self.open = true;
        }
        Ok(())
    }
}

impl Drop for OpenClGate {
    fn drop(&mut self) {
        if self.open().is_err() {
            trace_warn!("gate_release_failed", open = self.open);
        }
    }
}

/// An OpenCL device with one in-order command queue.
pub struct OpenClBackend {
    info: DeviceInfo,
    // Field order is drop order: queue before context.
    queue: CommandQueue,
    context: Context,
    _device: Device,
}

impl std::fmt::Debug for OpenClBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenClBackend")
            .field("device", &self.info)
            .finish_non_exhaustive()
    }
}

fn cl_device_type_of(kind: DeviceKind) -> cl_device_type {
    match kind {
        DeviceKind::Any => CL_DEVICE_TYPE_ALL,
        DeviceKind::Cpu => CL_DEVICE_TYPE_CPU,
        DeviceKind::Gpu => CL_DEVICE_TYPE_GPU,
        DeviceKind::Accelerator => CL_DEVICE_TYPE_ACCELERATOR,
    }
}

fn device_kind_of(device_type: cl_device_type) -> DeviceKind {
    if device_type & CL_DEVICE_TYPE_GPU != 0 {
        DeviceKind::Gpu
    } else if device_type & CL_DEVICE_TYPE_CPU != 0 {
        DeviceKind::Cpu
    } else if device_type & CL_DEVICE_TYPE_ACCELERATOR != 0 {
        DeviceKind::Accelerator
    } else {
        DeviceKind::Any
    }
}

fn describe(device: &Device) -> DeviceInfo {
    DeviceInfo {
        name: device.name().unwrap_or_default().trim().to_string(),
        kind: device_kind_of(device.dev_type().unwrap_or(0)),
        compute_units: device.max_compute_units().unwrap_or(1) as usize,
    }
}

fn backend_err(op: &'static str) -> impl Fn(ClError) -> TileSearchError {
    move |err| TileSearchError::backend(op, err.0)
}

impl OpenClBackend {
    /// Devices on every platform matching `selector.kind`.
    pub fn enumerate(selector: &DeviceSelector) -> TileSearchResult<Vec<Device>> {
        match get_all_devices(cl_device_type_of(selector.kind)) {
            Ok(ids) => Ok(ids.into_iter().map(Device::new).collect()),
            Err(ClError(status::DEVICE_NOT_FOUND)) => Ok(Vec::new()),
            Err(ClError(code)) => Err(TileSearchError::Environment {
                op: "clGetDeviceIDs",
                code,
            }),
        }
    }
}

impl ComputeBackend for OpenClBackend {
    type Buffer = OpenClBuffer;
    type Kernel = OpenClKernel;
    type Event = Event;
    type Gate = OpenClGate;

    fn open(selector: &DeviceSelector) -> TileSearchResult<Self> {
        let _span = trace_span!("device_select", selector = %selector).entered();

        let device = Self::enumerate(selector)?
            .into_iter()
            .nth(selector.index.unwrap_or(0))
            .ok_or_else(|| TileSearchError::NoDeviceFound {
                selector: selector.to_string(),
            })?;
        let info = describe(&device);

        let context = Context::from_device(&device).map_err(|err| TileSearchError::Environment {
            op: "clCreateContext",
            code: err.0,
        })?;
        #[allow(deprecated)]
        let queue = CommandQueue::create_default(&context, CL_QUEUE_PROFILING_ENABLE).map_err(
            |err| TileSearchError::Environment {
                op: "clCreateCommandQueue",
                code: err.0,
            },
        )?;

        trace_event!("device_opened", device = info.name.as_str());
        Ok(Self {
            info,
            queue,
            context,
            _device: device,
        })
    }

    fn device(&self) -> &DeviceInfo {
        &self.info
    }

    fn build_kernel(
        &mut self,
        source: &KernelSource,
        entry: &str,
    ) -> TileSearchResult<Self::Kernel> {
        let _span = trace_span!("kernel_build", entry = entry).entered();

        let program = Program::create_and_build_from_source(&self.context, source.text(), "")
            .map_err(|log| TileSearchError::Compile {
                kernel: entry.to_string(),
                log: format!("{}:\n{log}", source.origin()),
            })?;
        let inner = Kernel::create(&program, entry).map_err(|err| TileSearchError::Compile {
            kernel: entry.to_string(),
            log: format!(
                "{}: clCreateKernel failed with status {}",
                source.origin(),
                err.0
            ),
        })?;
        Ok(OpenClKernel {
            entry: entry.to_string(),
            inner,
            _program: program,
        })
    }

    fn alloc(&mut self, len: usize, access: Access) -> TileSearchResult<Self::Buffer> {
        let flags = match access {
            Access::ReadOnly => CL_MEM_READ_ONLY,
            Access::WriteOnly => CL_MEM_WRITE_ONLY,
            Access::ReadWrite => CL_MEM_READ_WRITE,
        };
        let inner = unsafe {
            Buffer::<cl_uint>::create(&self.context, flags, len, ptr::null_mut())
                .map_err(backend_err("alloc"))?
        };
        let mut buffer = OpenClBuffer { inner, len };
        self.enqueue_fill(&mut buffer, 0)?;
        Ok(buffer)
    }

    fn enqueue_fill(
        &mut self,
        buffer: &mut Self::Buffer,
        value: Cell,
    ) -> TileSearchResult<Self::Event> {
        let size = buffer.len * mem::size_of::<cl_uint>();
        unsafe {
            self.queue
                .enqueue_fill_buffer(&mut buffer.inner, &[value], 0, size, &[])
                .map_err(backend_err("enqueue_fill"))
        }
    }

    fn enqueue_write_point(
        &mut self,
        buffer: &mut Self::Buffer,
        index: usize,
        value: Cell,
    ) -> TileSearchResult<Self::Event> {
        if index >= buffer.len {
            return Err(TileSearchError::backend(
                "enqueue_write_point",
                status::INVALID_VALUE,
            ));
        }
        let offset = index * mem::size_of::<cl_uint>();
        // Blocking: the host value must outlive the transfer.
        unsafe {
            self.queue
                .enqueue_write_buffer(&mut buffer.inner, CL_BLOCKING, offset, &[value], &[])
                .map_err(backend_err("enqueue_write_point"))
        }
    }

    fn enqueue_dispatch(
        &mut self,
        kernel: &Self::Kernel,
        args: &[KernelArg<'_, Self::Buffer>],
        global: [usize; 2],
    ) -> TileSearchResult<Self::Event> {
        let mut exec = ExecuteKernel::new(&kernel.inner);
        for arg in args {
            unsafe {
                match arg {
                    KernelArg::Buffer(buffer) => exec.set_arg(&buffer.inner),
                    KernelArg::Uint(value) => exec.set_arg(value),
                };
            }
        }
        unsafe {
            exec.set_global_work_sizes(&global)
                .enqueue_nd_range(&self.queue)
                .map_err(backend_err("enqueue_dispatch"))
        }
    }

    fn read_buffer(&mut self, buffer: &Self::Buffer, out: &mut [Cell]) -> TileSearchResult<()> {
        if out.len() > buffer.len {
            return Err(TileSearchError::backend(
                "read_buffer",
                status::INVALID_BUFFER_SIZE,
            ));
        }
        let event = unsafe {
            self.queue
                .enqueue_read_buffer(&buffer.inner, CL_BLOCKING, 0, out, &[])
                .map_err(backend_err("read_buffer"))?
        };
        event.wait().map_err(backend_err("read_buffer"))
    }

    fn enqueue_barrier(&mut self) -> TileSearchResult<(Self::Gate, Self::Event)> {
        #[allow(unused_unsafe)]
        let raw = unsafe {
            cl3::event::create_user_event(self.context.get())
                .map_err(|code| TileSearchError::backend("enqueue_barrier", code))?
        };
        let gate = OpenClGate {
            event: Event::new(raw),
            open: false,
        };
        #[allow(unused_unsafe)]
        let barrier = unsafe {
            self.queue
                .enqueue_barrier_with_wait_list(&[gate.event.get()])
                .map_err(backend_err("enqueue_barrier"))?
        };
        Ok((gate, barrier))
    }

    fn enqueue_marker(&mut self) -> TileSearchResult<Self::Event> {
        #[allow(unused_unsafe)]
        unsafe {
            self.queue
                .enqueue_marker_with_wait_list(&[])
                .map_err(backend_err("enqueue_marker"))
        }
    }

    fn release(&mut self, mut gate: Self::Gate) -> TileSearchResult<()> {
        gate.open().map_err(backend_err("release"))?;
        self.queue.flush().map_err(backend_err("release"))
    }

    fn wait(&mut self, event: &Self::Event) -> TileSearchResult<()> {
        event.wait().map_err(backend_err("wait"))
    }

    fn event_times(&self, event: &Self::Event) -> TileSearchResult<EventTimes> {
        let read = backend_err("event_times");
        Ok(EventTimes {
            queued: event.profiling_command_queued().map_err(&read)?,
            start: event.profiling_command_start().map_err(&read)?,
            end: event.profiling_command_end().map_err(&read)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_type_mask_maps_to_kind() {
        assert_eq!(device_kind_of(CL_DEVICE_TYPE_GPU), DeviceKind::Gpu);
        assert_eq!(device_kind_of(CL_DEVICE_TYPE_CPU), DeviceKind::Cpu);
        assert_eq!(
            device_kind_of(CL_DEVICE_TYPE_ACCELERATOR),
            DeviceKind::Accelerator
        );
        assert_eq!(cl_device_type_of(DeviceKind::Any), CL_DEVICE_TYPE_ALL);
    }
}
