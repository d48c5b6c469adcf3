use std::sync::atomic::{AtomicU64, Ordering};

use inspecto_types::pixels::PixelBuffer;
use parking_lot::Mutex;

/// Single-slot cell carrying capture results from the render context to the
/// update context.
///
/// Only the render context publishes and only the update context takes. A new
/// publish replaces a result nobody took.
#[derive(Debug, Default)]
pub struct CaptureSlot {
    latest: Mutex<Option<PixelBuffer>>,
    published: AtomicU64,
}

impl CaptureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, buffer: PixelBuffer) {
        *self.latest.lock() = Some(buffer);
        self.published.fetch_add(1, Ordering::Release);
    }

    pub fn take(&self) -> Option<PixelBuffer> {
        self.latest.lock().take()
    }

    /// Number of results ever published.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use inspecto_types::pixels::ChannelOrder;

    use super::*;

    #[test]
    fn take_drains_the_latest_publish() {
        let slot = CaptureSlot::new();
        assert!(slot.take().is_none());

        slot.publish(PixelBuffer::empty());
        let filled = PixelBuffer::new(1, 1, ChannelOrder::Bgra, vec![1, 2, 3, 4]).expect("valid");
        slot.publish(filled.clone());

        assert_eq!(slot.published_count(), 2);
        assert_eq!(slot.take(), Some(filled));
        assert!(slot.take().is_none());
    }
}
