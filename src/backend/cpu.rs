//! Host CPU device with an in-order command stream.
//!
//! Commands are sent over a channel to a single device thread and executed in
//! submission order; data-parallel work inside a command (fills, tile search)
//! runs on a dedicated rayon pool. Events carry timestamps taken by the device
//! thread against the device epoch, so elapsed times never include host-side
//! enqueue overhead unless the caller measures from an enqueue timestamp.
//!
//! The first failing command poisons the stream: every later command,
//! including markers, completes with the same status.

use crate::backend::native::{BoundArg, Launch, NativeKernel};
use crate::backend::{
    status, Access, ComputeBackend, DeviceInfo, DeviceKind, DeviceSelector, EventTimes, KernelArg,
    KernelSource,
};
use crate::image::Cell;
use crate::trace::{trace_event, trace_span};
use crate::util::{TileSearchError, TileSearchResult};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Device memory: shared cell storage plus its kernel access mode.
#[derive(Clone, Debug)]
pub struct CpuBuffer {
    storage: Arc<RwLock<Vec<Cell>>>,
    access: Access,
    len: usize,
}

impl CpuBuffer {
    pub(crate) fn zeroed(len: usize, access: Access) -> Result<Self, i32> {
        if len == 0 {
            return Err(status::INVALID_BUFFER_SIZE);
        }
        let mut cells = Vec::new();
        cells
            .try_reserve_exact(len)
            .map_err(|_| status::MEM_OBJECT_ALLOCATION_FAILURE)?;
        cells.resize(len, 0);
        Ok(Self {
            storage: Arc::new(RwLock::new(cells)),
            access,
            len,
        })
    }

    pub(crate) fn storage(&self) -> &Arc<RwLock<Vec<Cell>>> {
        &self.storage
    }

    pub fn access(&self) -> Access {
        self.access
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Kernel bound to a native implementation.
#[derive(Clone, Debug)]
pub struct CpuKernel {
    entry: String,
    native: NativeKernel,
}

impl CpuKernel {
    pub fn entry(&self) -> &str {
        &self.entry
    }
}

#[derive(Debug, Default)]
struct EventStatus {
    start: u64,
    end: u64,
    outcome: Option<Result<(), i32>>,
}

#[derive(Debug)]
struct EventState {
    op: &'static str,
    queued: u64,
    status: Mutex<EventStatus>,
    done: Condvar,
}

impl EventState {
    fn new(op: &'static str, queued: u64) -> Arc<Self> {
        Arc::new(Self {
            op,
            queued,
            status: Mutex::new(EventStatus::default()),
            done: Condvar::new(),
        })
    }

    fn complete(&self, start: u64, end: u64, outcome: Result<(), i32>) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        status.start = start;
        status.end = end;
        status.outcome = Some(outcome);
        self.done.notify_all();
    }
}

/// Completion handle for one command.
#[derive(Clone, Debug)]
pub struct CpuEvent {
    state: Arc<EventState>,
}

#[derive(Debug, Default)]
struct GateState {
    open: Mutex<bool>,
    opened: Condvar,
}

impl GateState {
    fn open(&self) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        *open = true;
        self.opened.notify_all();
    }

    fn wait_open(&self) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        while !*open {
            open = self
                .opened
                .wait(open)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Holds a barrier closed. Dropping the gate releases it.
#[derive(Debug)]
pub struct CpuGate {
    state: Arc<GateState>,
}

impl Drop for CpuGate {
    fn drop(&mut self) {
        self.state.open();
    }
}

#[derive(Clone, Copy, Debug)]
struct DeviceClock {
    epoch: Instant,
}

impl DeviceClock {
    fn now_ns(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

enum Command {
    Fill { buffer: CpuBuffer, value: Cell },
    WritePoint { buffer: CpuBuffer, index: usize, value: Cell },
    Dispatch(Launch),
    Read { buffer: CpuBuffer, reply: Sender<Vec<Cell>> },
    Barrier(Arc<GateState>),
    Marker,
}

struct Submission {
    command: Command,
    event: Arc<EventState>,
}

/// The host CPU exposed as a single compute device.
pub struct CpuBackend {
    info: DeviceInfo,
    clock: DeviceClock,
    sender: Option<Sender<Submission>>,
    worker: Option<JoinHandle<()>>,
    gates: Vec<Weak<GateState>>,
}

impl std::fmt::Debug for CpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuBackend")
            .field("device", &self.info)
            .finish_non_exhaustive()
    }
}

impl CpuBackend {
    /// Devices this backend can offer for `selector`.
    pub fn enumerate(selector: &DeviceSelector) -> Vec<DeviceInfo> {
        let compute_units = selector.threads.unwrap_or_else(rayon::current_num_threads);
        let host = DeviceInfo {
            name: format!("host cpu ({compute_units} threads)"),
            kind: DeviceKind::Cpu,
            compute_units,
        };
        [host]
            .into_iter()
            .filter(|device| selector.kind.accepts(device.kind))
            .collect()
    }

    fn submit(&mut self, op: &'static str, command: Command) -> TileSearchResult<CpuEvent> {
        let event = EventState::new(op, self.clock.now_ns());
        let sender = self
            .sender
            .as_ref()
            .ok_or(TileSearchError::backend(op, status::INVALID_OPERATION))?;
        sender
            .send(Submission {
                command,
                event: Arc::clone(&event),
            })
            .map_err(|_| TileSearchError::backend(op, status::OUT_OF_RESOURCES))?;
        Ok(CpuEvent { state: event })
    }
}

impl ComputeBackend for CpuBackend {
    type Buffer = CpuBuffer;
    type Kernel = CpuKernel;
    type Event = CpuEvent;
    type Gate = CpuGate;

    fn open(selector: &DeviceSelector) -> TileSearchResult<Self> {
        let _span = trace_span!("device_select", selector = %selector).entered();

        if selector.threads == Some(0) {
            return Err(TileSearchError::InvalidArgument(
                "device thread count must be at least 1".into(),
            ));
        }
        let devices = Self::enumerate(selector);
        let info = devices
            .into_iter()
            .nth(selector.index.unwrap_or(0))
            .ok_or_else(|| TileSearchError::NoDeviceFound {
                selector: selector.to_string(),
            })?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(info.compute_units)
            .thread_name(|idx| format!("tilesearch-device-{idx}"))
            .build()
            .map_err(|_| TileSearchError::Environment {
                op: "ThreadPoolBuilder::build",
                code: status::OUT_OF_RESOURCES,
            })?;

        let clock = DeviceClock {
            epoch: Instant::now(),
        };
        let (sender, receiver) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("tilesearch-queue".into())
            .spawn(move || device_loop(receiver, pool, clock))
            .map_err(|_| TileSearchError::Environment {
                op: "thread::spawn",
                code: status::OUT_OF_RESOURCES,
            })?;

        trace_event!("device_opened", device = info.name.as_str());
        Ok(Self {
            info,
            clock,
            sender: Some(sender),
            worker: Some(worker),
            gates: Vec::new(),
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

        let declared = source.entry_points();
        let compile_error = |log: String| TileSearchError::Compile {
            kernel: entry.to_string(),
            log,
        };
        let found = declared.iter().find(|ep| ep.name == entry).ok_or_else(|| {
            let names: Vec<_> = declared.iter().map(|ep| ep.name.as_str()).collect();
            compile_error(format!(
                "{}: no __kernel named `{entry}` (declared: [{}])",
                source.origin(),
                names.join(", ")
            ))
        })?;
        let native = NativeKernel::lookup(entry).ok_or_else(|| {
            compile_error(format!(
                "{}: device `{}` has no implementation of `{entry}`",
                source.origin(),
                self.info.name
            ))
        })?;
        if found.params != native.arity() {
            return Err(compile_error(format!(
                "{}: `{entry}` declares {} parameters, expected {}",
                source.origin(),
                found.params,
                native.arity()
            )));
        }

        Ok(CpuKernel {
            entry: entry.to_string(),
            native,
        })
    }

    fn alloc(&mut self, len: usize, access: Access) -> TileSearchResult<Self::Buffer> {
        CpuBuffer::zeroed(len, access).map_err(|code| TileSearchError::backend("alloc", code))
    }

    fn enqueue_fill(
        &mut self,
        buffer: &mut Self::Buffer,
        value: Cell,
    ) -> TileSearchResult<Self::Event> {
        let buffer = buffer.clone();
        self.submit("enqueue_fill", Command::Fill { buffer, value })
    }

    fn enqueue_write_point(
        &mut self,
        buffer: &mut Self::Buffer,
        index: usize,
        value: Cell,
    ) -> TileSearchResult<Self::Event> {
        if index >= buffer.len() {
            return Err(TileSearchError::backend(
                "enqueue_write_point",
                status::INVALID_VALUE,
            ));
        }
        let buffer = buffer.clone();
        self.submit(
            "enqueue_write_point",
            Command::WritePoint {
                buffer,
                index,
                value,
            },
        )
    }

    fn enqueue_dispatch(
        &mut self,
        kernel: &Self::Kernel,
        args: &[KernelArg<'_, Self::Buffer>],
        global: [usize; 2],
    ) -> TileSearchResult<Self::Event> {
        let bound = args
            .iter()
            .map(|arg| match arg {
                KernelArg::Buffer(buffer) => BoundArg::Buffer((*buffer).clone()),
                KernelArg::Uint(value) => BoundArg::Uint(*value),
            })
            .collect();
        let launch = kernel
            .native
            .bind(bound, global)
            .map_err(|code| TileSearchError::backend("enqueue_dispatch", code))?;
        self.submit("enqueue_dispatch", Command::Dispatch(launch))
    }

    fn read_buffer(&mut self, buffer: &Self::Buffer, out: &mut [Cell]) -> TileSearchResult<()> {
        if out.len() > buffer.len() {
            return Err(TileSearchError::backend("read_buffer", status::INVALID_VALUE));
        }
        let (reply, cells) = mpsc::channel();
        let event = self.submit(
            "read_buffer",
            Command::Read {
                buffer: buffer.clone(),
                reply,
            },
        )?;
        self.wait(&event)?;
        let cells = cells
            .recv()
            .map_err(|_| TileSearchError::backend("read_buffer", status::OUT_OF_RESOURCES))?;
        out.copy_from_slice(&cells[..out.len()]);
        Ok(())
    }

    fn enqueue_barrier(&mut self) -> TileSearchResult<(Self::Gate, Self::Event)> {
        let state = Arc::new(GateState::default());
        self.gates.retain(|gate| gate.strong_count() > 0);
        self.gates.push(Arc::downgrade(&state));
        let event = self.submit("enqueue_barrier", Command::Barrier(Arc::clone(&state)))?;
        Ok((CpuGate { state }, event))
    }

    fn enqueue_marker(&mut self) -> TileSearchResult<Self::Event> {
        self.submit("enqueue_marker", Command::Marker)
    }

    fn release(&mut self, gate: Self::Gate) -> TileSearchResult<()> {
        gate.state.open();
        Ok(())
    }

    fn wait(&mut self, event: &Self::Event) -> TileSearchResult<()> {
        let state = &event.state;
        let mut status = state.status.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match status.outcome {
                Some(Ok(())) => return Ok(()),
                Some(Err(code)) => return Err(TileSearchError::backend(state.op, code)),
                None => {
                    status = state
                        .done
                        .wait(status)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    fn event_times(&self, event: &Self::Event) -> TileSearchResult<EventTimes> {
        let state = &event.state;
        let status = state.status.lock().unwrap_or_else(PoisonError::into_inner);
        match status.outcome {
            Some(Ok(())) => Ok(EventTimes {
                queued: state.queued,
                start: status.start,
                end: status.end,
            }),
            Some(Err(code)) => Err(TileSearchError::backend(state.op, code)),
            None => Err(TileSearchError::backend(
                "event_times",
                status::PROFILING_INFO_NOT_AVAILABLE,
            )),
        }
    }
}

impl Drop for CpuBackend {
    fn drop(&mut self) {
        for gate in self.gates.drain(..) {
            if let Some(gate) = gate.upgrade() {
                gate.open();
            }
        }
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn device_loop(receiver: Receiver<Submission>, pool: ThreadPool, clock: DeviceClock) {
    let mut poisoned: Option<i32> = None;
    for Submission { command, event } in receiver {
        let start = clock.now_ns();
        let outcome = match poisoned {
            Some(code) => Err(code),
            None => execute(&pool, command),
        };
        let end = clock.now_ns();
        if let Err(code) = outcome {
            poisoned.get_or_insert(code);
        }
        event.complete(start, end, outcome);
    }
}

fn execute(pool: &ThreadPool, command: Command) -> Result<(), i32> {
    match command {
        Command::Fill { buffer, value } => {
            let mut guard = buffer
                .storage()
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let cells: &mut [Cell] = &mut guard;
            pool.install(|| cells.par_iter_mut().for_each(|cell| *cell = value));
            Ok(())
        }
        Command::WritePoint {
            buffer,
            index,
            value,
        } => {
            let mut cells = buffer
                .storage()
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let cell = cells.get_mut(index).ok_or(status::INVALID_VALUE)?;
            *cell = value;
            Ok(())
        }
        Command::Dispatch(launch) => pool.install(|| launch.execute()),
        Command::Read { buffer, reply } => {
            let cells = buffer
                .storage()
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            reply.send(cells).map_err(|_| status::INVALID_OPERATION)
        }
        Command::Barrier(gate) => {
            gate.wait_open();
            Ok(())
        }
        Command::Marker => Ok(()),
    }
}
