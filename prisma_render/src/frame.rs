/// Frame-in-flight synchronization
///
/// One slot per frame in flight, each holding an in-flight fence (created
/// signaled so the first wait returns immediately), an image-available
/// semaphore signaled by acquire, and a render-finished semaphore waited on
/// by present. Slot K's uniform buffers may only be written after slot K's
/// fence was waited on.

use crate::error::Result;
use crate::graphics_device::{FenceHandle, GraphicsDevice, SemaphoreHandle, SubmitSync};
use crate::engine_debug;

const SOURCE: &str = "prisma::FrameSync";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlot {
    pub in_flight: FenceHandle,
    pub image_available: SemaphoreHandle,
    pub render_finished: SemaphoreHandle,
}

impl FrameSlot {
    /// Wait on image-available, signal render-finished and the fence
    pub fn submit_sync(&self) -> SubmitSync {
        SubmitSync {
            wait: Some(self.image_available),
            signal: Some(self.render_finished),
            fence: Some(self.in_flight),
        }
    }
}

pub struct FrameSync {
    slots: Vec<FrameSlot>,
    current: usize,
}

impl FrameSync {
    pub fn new(device: &mut dyn GraphicsDevice, frames_in_flight: usize) -> Result<Self> {
        let mut sync = Self { slots: Vec::with_capacity(frames_in_flight.max(1)), current: 0 };
        for i in 0..frames_in_flight.max(1) {
            match create_slot(device, i) {
                Ok(slot) => sync.slots.push(slot),
                Err(e) => {
                    sync.destroy(device);
                    return Err(e);
                }
            }
        }
        engine_debug!(SOURCE, "{} frame slots created", sync.slots.len());
        Ok(sync)
    }

    /// No slots; stands in until `new()` succeeds
    pub fn empty() -> Self {
        Self { slots: Vec::new(), current: 0 }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Index of the slot the next frame records into
    pub fn frame_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> FrameSlot {
        self.slots[self.current]
    }

    /// Block until the current slot's previous submission completed
    pub fn wait(&self, device: &mut dyn GraphicsDevice) -> Result<()> {
        device.wait_for_fence(self.current().in_flight)
    }

    /// Unsignal the current fence right before it is submitted again
    pub fn reset(&self, device: &mut dyn GraphicsDevice) -> Result<()> {
        device.reset_fence(self.current().in_flight)
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }

    pub fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        for slot in self.slots.drain(..) {
            device.destroy_fence(slot.in_flight);
            device.destroy_semaphore(slot.image_available);
            device.destroy_semaphore(slot.render_finished);
        }
        self.current = 0;
    }
}

fn create_slot(device: &mut dyn GraphicsDevice, index: usize) -> Result<FrameSlot> {
    let in_flight = device.create_fence(&format!("in_flight_frame{}", index), true)?;
    let image_available = match device.create_semaphore(&format!("image_available_frame{}", index)) {
        Ok(semaphore) => semaphore,
        Err(e) => {
            device.destroy_fence(in_flight);
            return Err(e);
        }
    };
    let render_finished = match device.create_semaphore(&format!("render_finished_frame{}", index)) {
        Ok(semaphore) => semaphore,
        Err(e) => {
            device.destroy_fence(in_flight);
            device.destroy_semaphore(image_available);
            return Err(e);
        }
    };
    Ok(FrameSlot { in_flight, image_available, render_finished })
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
