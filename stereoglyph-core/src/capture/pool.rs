//! Frame buffer pool
//!
//! Tracks the driver-mapped regions of one camera and who currently owns
//! each of them. The driver only ever writes a buffer while it is queued, so
//! reading is only allowed between dequeue and requeue.

use std::io;

use super::device::{CaptureDevice, MappedRegion};
use crate::error::{Result, StereoError};
use crate::types::{PixelOrder, copy_to_rgb};

/// Ownership of one pool slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Mapped, held by the application, not yet queued
    Mapped,
    /// In the driver's queue
    Queued,
    /// Handed back by the driver, readable by the application
    Dequeued,
}

#[derive(Debug)]
struct Slot {
    region: MappedRegion,
    state: BufferState,
}

/// Fixed set of mapped buffers for one device
#[derive(Debug, Default)]
pub struct BufferPool {
    slots: Vec<Slot>,
}

fn ownership_error(operation: &str, msg: String) -> StereoError {
    StereoError::device_io(operation, io::Error::new(io::ErrorKind::InvalidInput, msg))
}

impl BufferPool {
    /// Empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly mapped region; its index is the current length
    pub fn push(&mut self, region: MappedRegion) -> u32 {
        self.slots.push(Slot {
            region,
            state: BufferState::Mapped,
        });
        (self.slots.len() - 1) as u32
    }

    /// Number of buffers
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool holds no buffers
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of buffers currently owned by the driver
    pub fn queued_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == BufferState::Queued)
            .count()
    }

    /// State of buffer `index`
    pub fn state(&self, index: u32) -> Option<BufferState> {
        self.slots.get(index as usize).map(|s| s.state)
    }

    fn slot_mut(&mut self, operation: &str, index: u32) -> Result<&mut Slot> {
        let len = self.slots.len();
        self.slots.get_mut(index as usize).ok_or_else(|| {
            ownership_error(
                operation,
                format!("buffer index {} out of range (pool of {})", index, len),
            )
        })
    }

    /// Record that buffer `index` was handed to the driver
    pub fn mark_queued(&mut self, index: u32) -> Result<()> {
        let slot = self.slot_mut("VIDIOC_QBUF", index)?;
        if slot.state == BufferState::Queued {
            return Err(ownership_error(
                "VIDIOC_QBUF",
                format!("buffer {} is already queued", index),
            ));
        }
        slot.state = BufferState::Queued;
        Ok(())
    }

    /// Record that the driver returned buffer `index`
    pub fn mark_dequeued(&mut self, index: u32) -> Result<()> {
        let slot = self.slot_mut("VIDIOC_DQBUF", index)?;
        if slot.state != BufferState::Queued {
            return Err(ownership_error(
                "VIDIOC_DQBUF",
                format!(
                    "driver returned buffer {} which was not queued ({:?})",
                    index, slot.state
                ),
            ));
        }
        slot.state = BufferState::Dequeued;
        Ok(())
    }

    /// Copy up to `bytes_used` bytes of dequeued buffer `index` into `dst`,
    /// converting from `order` to RGB. Returns the number of bytes copied.
    pub fn copy_out(
        &mut self,
        index: u32,
        bytes_used: usize,
        dst: &mut [u8],
        order: PixelOrder,
    ) -> Result<usize> {
        let slot = self.slot_mut("copy", index)?;
        if slot.state != BufferState::Dequeued {
            return Err(ownership_error(
                "copy",
                format!("buffer {} is not dequeued ({:?})", index, slot.state),
            ));
        }
        // SAFETY: the buffer is dequeued, so the driver is not writing to it
        let src = unsafe { slot.region.as_slice() };
        let used = bytes_used.min(src.len());
        Ok(copy_to_rgb(&src[..used], dst, order))
    }

    /// After stream-off every buffer is back with the application
    pub fn reset_to_mapped(&mut self) {
        for slot in &mut self.slots {
            slot.state = BufferState::Mapped;
        }
    }

    /// Unmap every buffer through `device`
    ///
    /// Each region is consumed exactly once. Failures are collected rather
    /// than stopping the drain, so every region gets its unmap attempt.
    pub fn drain(&mut self, device: &mut dyn CaptureDevice) -> Vec<StereoError> {
        self.slots
            .drain(..)
            .filter_map(|slot| device.unmap_buffer(slot.region).err())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr::NonNull;

    fn region(bytes: &mut Vec<u8>) -> MappedRegion {
        let ptr = NonNull::new(bytes.as_mut_ptr()).unwrap();
        unsafe { MappedRegion::from_raw_parts(ptr, bytes.len()) }
    }

    #[test]
    fn test_state_transitions() {
        let mut backing = vec![1u8, 2, 3, 4, 5, 6];
        let mut pool = BufferPool::new();
        let idx = pool.push(region(&mut backing));
        assert_eq!(pool.state(idx), Some(BufferState::Mapped));

        let mut dst = [0u8; 6];
        assert!(pool.copy_out(idx, 6, &mut dst, PixelOrder::Rgb).is_err());
        assert!(pool.mark_dequeued(idx).is_err());

        pool.mark_queued(idx).unwrap();
        assert!(pool.mark_queued(idx).is_err());
        assert_eq!(pool.queued_count(), 1);

        pool.mark_dequeued(idx).unwrap();
        assert_eq!(pool.copy_out(idx, 6, &mut dst, PixelOrder::Bgr).unwrap(), 6);
        assert_eq!(dst, [3, 2, 1, 6, 5, 4]);

        pool.reset_to_mapped();
        assert_eq!(pool.state(idx), Some(BufferState::Mapped));
    }

    #[test]
    fn test_out_of_range_index() {
        let mut pool = BufferPool::new();
        assert!(pool.mark_queued(3).is_err());
        assert_eq!(pool.state(0), None);
    }
}
