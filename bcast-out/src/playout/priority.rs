//! Real-time priority for device callback threads
//!
//! The device owns its callback threads, so priority can only be raised from
//! inside a callback. Each role is elevated the first time it calls in.

use bcast_common::ThreadPriority;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error};

/// Device callback thread roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackRole {
    Video = 0,
    Audio = 1,
}

/// Applies the configured priority once per callback role
#[derive(Debug)]
pub struct PriorityElevator {
    hint: Option<ThreadPriority>,
    applied: [AtomicBool; 2],
}

impl PriorityElevator {
    pub fn new(hint: Option<ThreadPriority>) -> Self {
        Self {
            hint,
            applied: [AtomicBool::new(false), AtomicBool::new(false)],
        }
    }

    /// Forget earlier elevations (called at the start of each session)
    pub fn reset(&self) {
        for flag in &self.applied {
            flag.store(false, Ordering::SeqCst);
        }
    }

    pub fn is_applied(&self, role: CallbackRole) -> bool {
        self.applied[role as usize].load(Ordering::SeqCst)
    }

    /// Raise the calling thread's priority unless this role was already handled
    pub fn elevate(&self, role: CallbackRole) {
        if self.applied[role as usize].swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(hint) = self.hint else {
            return;
        };
        match set_current_thread_priority(hint) {
            Ok(priority) => debug!("{:?} callback thread priority set to {}", role, priority),
            Err(e) => error!("Failed to raise {:?} callback thread priority: {}", role, e),
        }
    }
}

#[cfg(unix)]
fn set_current_thread_priority(hint: ThreadPriority) -> std::io::Result<i32> {
    // SAFETY: plain libc calls on the current thread with a zero-initialised sched_param
    unsafe {
        let priority = match hint {
            ThreadPriority::Max => libc::sched_get_priority_max(libc::SCHED_FIFO) - 1,
            ThreadPriority::Min => libc::sched_get_priority_min(libc::SCHED_FIFO) + 1,
            ThreadPriority::Explicit(value) => value,
        };
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = priority;
        let rc = libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param);
        if rc != 0 {
            return Err(std::io::Error::from_raw_os_error(rc));
        }
        Ok(priority)
    }
}

#[cfg(not(unix))]
fn set_current_thread_priority(_hint: ThreadPriority) -> std::io::Result<i32> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "real-time priority not supported on this platform",
    ))
}
