//! Public output handle
//!
//! Wraps an [`OutputScheduler`] behind the operation serializer so Open, Start
//! and Stop issued from any thread run one at a time on the worker.

use super::scheduler::OutputScheduler;
use super::serializer::{Operation, OperationSerializer};
use super::stats::StatsSnapshot;
use crate::device::DeviceDriver;
use crate::error::Result;
use crate::frame::FrameSource;
use bcast_common::{OutputConfig, OutputEvent};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

pub struct Output {
    scheduler: Arc<OutputScheduler>,
    serializer: OperationSerializer,
    driver: Arc<dyn DeviceDriver>,
}

impl Output {
    pub fn new(
        config: OutputConfig,
        driver: Arc<dyn DeviceDriver>,
        source: Box<dyn FrameSource>,
    ) -> Result<Self> {
        config.validate()?;
        let scheduler = OutputScheduler::new(config, Arc::clone(&driver), source)?;
        let serializer = OperationSerializer::spawn(scheduler.clone());
        scheduler.set_stop_handle(serializer.stop_handle());
        Ok(Self {
            scheduler,
            serializer,
            driver,
        })
    }

    /// Open the device at `card`
    pub fn open(&self, card: u32) -> bool {
        let Ok(card) = i32::try_from(card) else {
            return false;
        };
        self.serializer.execute(Operation::Open, card)
    }

    /// Open the card named in the configuration
    pub fn open_configured(&self) -> bool {
        self.open(self.scheduler.config().card)
    }

    /// Start output and preroll; returns once playback is under way or failed
    pub fn start(&self) -> bool {
        let preroll = i32::try_from(self.scheduler.config().preroll).unwrap_or(i32::MAX);
        self.serializer.execute(Operation::Start, preroll)
    }

    pub fn stop(&self) -> bool {
        self.serializer.execute(Operation::Stop, 0)
    }

    /// Stop output and shut the worker down; later calls all fail
    pub fn close(&self) -> bool {
        if self.serializer.is_exited() {
            return false;
        }
        self.stop();
        let exited = self.serializer.execute(Operation::Exit, 0);
        info!("Output closed");
        exited
    }

    pub fn is_stopped(&self) -> bool {
        !self.scheduler.is_running()
    }

    pub fn list_devices(&self) -> Result<Vec<String>> {
        self.driver.list_devices()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutputEvent> {
        self.scheduler.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.scheduler.stats()
    }

    pub fn top_field_first(&self) -> bool {
        self.scheduler.top_field_first()
    }

    pub fn scheduler(&self) -> &Arc<OutputScheduler> {
        &self.scheduler
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        self.close();
    }
}
