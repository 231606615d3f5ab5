//! Fixed pool of device frame buffers
//!
//! Buffers are allocated once per session and cycle between the ready queue
//! and the in-flight queue. A buffer is in flight from a successful schedule
//! until the next completion callback retires the oldest one, so at most
//! `capacity` buffers are ever in flight.

use crate::device::{OutputDevice, PixelFormat, SharedFrame};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Default)]
pub struct FramePool {
    ready: Mutex<VecDeque<SharedFrame>>,
    in_flight: Mutex<VecDeque<SharedFrame>>,
    last_rendered: Mutex<Option<SharedFrame>>,
    capacity: AtomicUsize,
    high_water: AtomicUsize,
}

impl FramePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `count` buffers from the device into the ready queue
    pub fn allocate(
        &self,
        device: &dyn OutputDevice,
        count: usize,
        width: u32,
        height: u32,
        row_bytes: usize,
        format: PixelFormat,
    ) -> Result<()> {
        let mut frames = VecDeque::with_capacity(count);
        for i in 0..count {
            let frame = device
                .create_video_frame(width, height, row_bytes, format)
                .map_err(|e| {
                    error!("CreateVideoFrame ({}) failed: {}", i, e);
                    Error::Allocation(format!("frame {} of {}: {}", i, count, e))
                })?;
            frames.push_back(frame);
        }
        *self.ready.lock() = frames;
        self.in_flight.lock().clear();
        self.capacity.store(count, Ordering::SeqCst);
        self.high_water.store(0, Ordering::SeqCst);
        debug!("Allocated {} {:?} buffers ({}x{})", count, format, width, height);
        Ok(())
    }

    pub fn pop_ready(&self) -> Option<SharedFrame> {
        self.ready.lock().pop_front()
    }

    pub fn push_ready(&self, frame: SharedFrame) {
        self.ready.lock().push_back(frame);
    }

    pub fn push_in_flight(&self, frame: SharedFrame) {
        let mut in_flight = self.in_flight.lock();
        in_flight.push_back(frame);
        self.high_water.fetch_max(in_flight.len(), Ordering::SeqCst);
    }

    /// Move the oldest in-flight buffer back to ready; false if none was in flight
    pub fn retire_oldest(&self) -> bool {
        let oldest = self.in_flight.lock().pop_front();
        match oldest {
            Some(frame) => {
                self.push_ready(frame);
                true
            }
            None => false,
        }
    }

    /// Remember the buffer holding the most recent real picture
    pub fn set_last_rendered(&self, frame: &SharedFrame) {
        *self.last_rendered.lock() = Some(Arc::clone(frame));
    }

    pub fn last_rendered(&self) -> Option<SharedFrame> {
        self.last_rendered.lock().clone()
    }

    /// Release every buffer; returns how many were held
    pub fn drain(&self) -> usize {
        let ready = std::mem::take(&mut *self.ready.lock()).len();
        let in_flight = std::mem::take(&mut *self.in_flight.lock()).len();
        *self.last_rendered.lock() = None;
        self.capacity.store(0, Ordering::SeqCst);
        ready + in_flight
    }

    pub fn ready_len(&self) -> usize {
        self.ready.lock().len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::SeqCst)
    }

    /// Most buffers simultaneously in flight since allocation
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.ready_len() == 0 && self.in_flight_len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::VirtualDevice;

    fn pool_with(count: usize) -> FramePool {
        let device = VirtualDevice::builder("Card").build();
        let pool = FramePool::new();
        pool.allocate(&*device, count, 16, 4, 32, PixelFormat::Yuv8)
            .unwrap();
        pool
    }

    #[test]
    fn test_cycle_ready_and_in_flight() {
        let pool = pool_with(5);
        assert_eq!(pool.capacity(), 5);
        for _ in 0..3 {
            let frame = pool.pop_ready().unwrap();
            pool.push_in_flight(frame);
        }
        assert_eq!((pool.ready_len(), pool.in_flight_len()), (2, 3));
        assert!(pool.retire_oldest());
        assert_eq!((pool.ready_len(), pool.in_flight_len()), (3, 2));
        assert_eq!(pool.high_water(), 3);
    }

    #[test]
    fn test_retire_oldest_is_fifo() {
        let pool = pool_with(2);
        let first = pool.pop_ready().unwrap();
        let second = pool.pop_ready().unwrap();
        pool.push_in_flight(first.clone());
        pool.push_in_flight(second);
        pool.retire_oldest();
        assert!(Arc::ptr_eq(&pool.pop_ready().unwrap(), &first));
    }

    #[test]
    fn test_allocation_failure_leaves_pool_empty() {
        let device = VirtualDevice::builder("Card").build();
        device.fail_frame_allocations(1);
        let pool = FramePool::new();
        let result = pool.allocate(&*device, 4, 16, 4, 32, PixelFormat::Yuv8);
        assert!(matches!(result, Err(Error::Allocation(_))));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_drain_empties_everything() {
        let pool = pool_with(4);
        let frame = pool.pop_ready().unwrap();
        pool.set_last_rendered(&frame);
        pool.push_in_flight(frame);
        assert_eq!(pool.drain(), 4);
        assert!(pool.is_empty());
        assert!(pool.last_rendered().is_none());
        assert!(!pool.retire_oldest());
    }
}
