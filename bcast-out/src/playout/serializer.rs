//! Operation serializer
//!
//! Open, Start, Stop and Exit requests may come from any thread but must run
//! one at a time on a single worker. Callers hand a request to the worker
//! through a one-entry slot and block until its result is posted. Each request
//! carries a generation number so a caller only ever collects its own result.

use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Serialized operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Open,
    Start,
    Stop,
    Exit,
}

/// Work executed on the serializer thread
pub trait OperationHandler: Send + Sync + 'static {
    fn open(&self, card: i32) -> bool;
    fn start(&self, preroll: i32) -> bool;
    fn stop(&self) -> bool;
    /// Runs after every Start; expected to do nothing unless output is running
    fn preroll(&self);
}

#[derive(Debug, Clone, Copy)]
struct Request {
    op: Operation,
    arg: i32,
    generation: u64,
}

#[derive(Default)]
struct Slot {
    pending: Option<Request>,
    busy: bool,
    done: Option<(u64, bool)>,
    next_generation: u64,
    stop_requested: bool,
    exited: bool,
}

impl Slot {
    fn is_free(&self) -> bool {
        self.pending.is_none() && !self.busy && self.done.is_none()
    }
}

struct Shared {
    slot: Mutex<Slot>,
    work: Condvar,
    done: Condvar,
}

/// Non-blocking handle for requesting a Stop from callback threads
#[derive(Clone)]
pub struct StopHandle {
    shared: Weak<Shared>,
}

impl StopHandle {
    /// Queue a Stop that the worker runs ahead of its next request
    pub fn request_stop(&self) {
        if let Some(shared) = self.shared.upgrade() {
            let mut slot = shared.slot.lock();
            if !slot.exited {
                slot.stop_requested = true;
                shared.work.notify_one();
            }
        }
    }
}

/// Single-worker request serializer
pub struct OperationSerializer {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl OperationSerializer {
    /// Spawn the worker thread
    pub fn spawn(handler: Arc<dyn OperationHandler>) -> Self {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::default()),
            work: Condvar::new(),
            done: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("bcast-op".to_string())
            .spawn(move || Self::worker_loop(worker_shared, handler));

        let thread = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("Failed to spawn operation worker: {}", e);
                shared.slot.lock().exited = true;
                None
            }
        };

        Self {
            shared,
            thread: Mutex::new(thread),
        }
    }

    /// Run `op` on the worker and wait for its result
    ///
    /// Returns false without doing anything once Exit has completed.
    pub fn execute(&self, op: Operation, arg: i32) -> bool {
        let generation = {
            let mut slot = self.shared.slot.lock();
            while !slot.exited && !slot.is_free() {
                self.shared.done.wait(&mut slot);
            }
            if slot.exited {
                return false;
            }

            let generation = slot.next_generation;
            slot.next_generation += 1;
            slot.pending = Some(Request {
                op,
                arg,
                generation,
            });
            self.shared.work.notify_one();

            loop {
                match slot.done {
                    Some((done_generation, result)) if done_generation == generation => {
                        slot.done = None;
                        self.shared.done.notify_all();
                        if op != Operation::Exit {
                            return result;
                        }
                        break generation;
                    }
                    _ => self.shared.done.wait(&mut slot),
                }
            }
        };

        debug!("Exit request {} completed, joining worker", generation);
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                error!("Operation worker panicked");
            }
        }
        true
    }

    /// Handle for deferred Stop requests
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn is_exited(&self) -> bool {
        self.shared.slot.lock().exited
    }

    fn worker_loop(shared: Arc<Shared>, handler: Arc<dyn OperationHandler>) {
        debug!("Operation worker started");

        loop {
            let request = {
                let mut slot = shared.slot.lock();
                while slot.pending.is_none() && !slot.stop_requested {
                    shared.work.wait(&mut slot);
                }
                slot.busy = true;
                if slot.stop_requested {
                    slot.stop_requested = false;
                    None
                } else {
                    slot.pending.take()
                }
            };

            let Some(request) = request else {
                info!("Running deferred stop");
                handler.stop();
                let mut slot = shared.slot.lock();
                slot.busy = false;
                shared.done.notify_all();
                continue;
            };

            debug!("Executing {:?}({})", request.op, request.arg);
            let result = match request.op {
                Operation::Open => handler.open(request.arg),
                Operation::Start => {
                    let started = handler.start(request.arg);
                    handler.preroll();
                    started
                }
                Operation::Stop => handler.stop(),
                Operation::Exit => true,
            };

            let mut slot = shared.slot.lock();
            slot.busy = false;
            slot.done = Some((request.generation, result));
            if request.op == Operation::Exit {
                slot.exited = true;
                slot.stop_requested = false;
            }
            shared.done.notify_all();
            if request.op == Operation::Exit {
                break;
            }
        }

        debug!("Operation worker exited");
    }
}

impl Drop for OperationSerializer {
    fn drop(&mut self) {
        if !self.is_exited() {
            self.execute(Operation::Exit, 0);
        }
    }
}
