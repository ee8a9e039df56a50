//! Manually pumped frame signal.
//!
//! Stands in for a display refresh: callbacks requested during frame `n`
//! run when frame `n` is pumped; callbacks requested while a frame is being
//! pumped wait for the next one.

use log::trace;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub type FrameCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
pub struct FrameClock {
    queue: Mutex<Vec<FrameCallback>>,
    frame: AtomicU64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `callback` for the next frame.
    pub fn request_frame(&self, callback: FrameCallback) {
        self.lock().push(callback);
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Number of frames pumped so far.
    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    /// Runs every callback queued before this call; returns how many ran.
    pub fn pump(&self) -> usize {
        let callbacks = std::mem::take(&mut *self.lock());
        let frame = self.frame.fetch_add(1, Ordering::AcqRel) + 1;
        let count = callbacks.len();
        for callback in callbacks {
            callback();
        }
        if count > 0 {
            trace!("event=frame_pump module=render status=ok frame={frame} callbacks={count}");
        }
        count
    }

    /// Pumps on a fixed interval until the task is dropped.
    pub async fn drive(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.pump();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FrameCallback>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
