// src/engine/graphics.rs
//! Graphics context abstraction for the demo engine.
//!
//! ## Lifecycle
//! 1. `init_display(window)` - bind a context to the window, report its size
//! 2. `present(color)` - clear to `color` and swap, any number of times
//! 3. `terminate()` - release the context and surface
//!
//! A failed `init_display` leaves the backend uninitialized; the engine logs
//! it and keeps running without drawing.

use crate::window::NativeWindow;
use anyhow::{bail, Result};
use log::{info, trace};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// Pixel format requested for window buffers (RGBX 8888).
pub const WINDOW_FORMAT_RGBX_8888: i32 = 2;

/// Size of the bound surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub width: i32,
    pub height: i32,
}

pub trait GraphicsBackend: Send {
    fn init_display(&mut self, window: &NativeWindow) -> Result<SurfaceInfo>;

    /// Clears to `rgba` and presents. Only called between a successful
    /// `init_display` and `terminate`.
    fn present(&mut self, rgba: [f32; 4]) -> Result<()>;

    fn terminate(&mut self);
}

/// What the headless backend has been asked to do so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameLog {
    pub inits: usize,
    pub terminations: usize,
    pub frames: usize,
    /// Window id and color of the most recent frame.
    pub last_frame: Option<(u64, [f32; 4])>,
    /// Window ids that received frames, without consecutive repeats.
    pub surfaces_drawn: Vec<u64>,
    pub bound_window: Option<u64>,
}

/// Host backend: no pixels, just bookkeeping plus a fixed presentation
/// interval standing in for vsync.
#[derive(Debug, Clone)]
pub struct HeadlessGraphics {
    log: Arc<Mutex<FrameLog>>,
    frame_interval: Duration,
    fail_init: bool,
}

impl HeadlessGraphics {
    pub fn new(frame_interval: Duration) -> Self {
        Self {
            log: Arc::new(Mutex::new(FrameLog::default())),
            frame_interval,
            fail_init: false,
        }
    }

    /// A backend whose `init_display` always fails.
    pub fn failing() -> Self {
        Self {
            fail_init: true,
            ..Self::new(Duration::ZERO)
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrameLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the log; clones share it.
    pub fn frame_log(&self) -> FrameLog {
        self.lock().clone()
    }
}

impl GraphicsBackend for HeadlessGraphics {
    fn init_display(&mut self, window: &NativeWindow) -> Result<SurfaceInfo> {
        if self.fail_init {
            bail!("Unable to make context current on window {}", window.id());
        }
        window.set_buffers_geometry(0, 0, WINDOW_FORMAT_RGBX_8888);
        let mut log = self.lock();
        log.inits += 1;
        log.bound_window = Some(window.id());
        info!(
            "HeadlessGraphics: bound to window {} ({}x{})",
            window.id(),
            window.width(),
            window.height()
        );
        Ok(SurfaceInfo {
            width: window.width(),
            height: window.height(),
        })
    }

    fn present(&mut self, rgba: [f32; 4]) -> Result<()> {
        {
            let mut log = self.lock();
            let Some(window) = log.bound_window else {
                bail!("present called without a bound surface");
            };
            log.frames += 1;
            log.last_frame = Some((window, rgba));
            if log.surfaces_drawn.last() != Some(&window) {
                log.surfaces_drawn.push(window);
            }
            trace!("HeadlessGraphics: frame {} on window {}", log.frames, window);
        }
        if !self.frame_interval.is_zero() {
            thread::sleep(self.frame_interval);
        }
        Ok(())
    }

    fn terminate(&mut self) {
        let mut log = self.lock();
        if let Some(window) = log.bound_window.take() {
            log.terminations += 1;
            info!("HeadlessGraphics: released window {}", window);
        }
    }
}
