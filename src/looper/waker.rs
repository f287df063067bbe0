// src/looper/waker.rs
//! Cross-thread signaling to wake a looper blocked in `poll_once`.

use anyhow::{Context, Result};
use log::trace;
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::sync::Arc;

/// Trait for waking an event loop from other threads.
pub trait EventLoopWaker: Send + Sync {
    /// Wake the event loop, causing it to return from a blocking poll.
    fn wake(&self) -> Result<()>;
}

/// Wakes a [`super::Looper`] by writing to its wake pipe.
///
/// The write end is non-blocking: a full pipe already guarantees a pending
/// wake, so `WouldBlock` counts as success.
#[derive(Debug, Clone)]
pub struct LooperWaker {
    pipe: Arc<File>,
}

impl LooperWaker {
    pub(crate) fn new(pipe: File) -> Self {
        Self {
            pipe: Arc::new(pipe),
        }
    }
}

impl EventLoopWaker for LooperWaker {
    fn wake(&self) -> Result<()> {
        match (&*self.pipe).write(&[1]) {
            Ok(_) => {
                trace!("LooperWaker: wake posted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e).context("Failed to write to looper wake pipe"),
        }
    }
}
