// src/window.rs

//! Window handles and geometry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

static NEXT_WINDOW_ID: AtomicU64 = AtomicU64::new(1);

/// A rectangle in window pixels. `right`/`bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    width: i32,
    height: i32,
    format: i32,
}

struct WindowInner {
    id: u64,
    geometry: Mutex<Geometry>,
}

/// A drawable surface owned by the platform.
///
/// Clones share the same surface; equality is surface identity.
#[derive(Clone)]
pub struct NativeWindow {
    inner: Arc<WindowInner>,
}

impl NativeWindow {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            inner: Arc::new(WindowInner {
                id: NEXT_WINDOW_ID.fetch_add(1, Ordering::Relaxed),
                geometry: Mutex::new(Geometry {
                    width,
                    height,
                    format: 0,
                }),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    fn geometry(&self) -> Geometry {
        *self
            .inner
            .geometry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn width(&self) -> i32 {
        self.geometry().width
    }

    pub fn height(&self) -> i32 {
        self.geometry().height
    }

    pub fn format(&self) -> i32 {
        self.geometry().format
    }

    /// Platform side: the surface changed size.
    pub fn resize(&self, width: i32, height: i32) {
        let mut geometry = self
            .inner
            .geometry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        geometry.width = width;
        geometry.height = height;
    }

    /// Sets the buffer pixel format. Zero width and height keep the
    /// current size.
    pub fn set_buffers_geometry(&self, width: i32, height: i32, format: i32) {
        let mut geometry = self
            .inner
            .geometry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if width > 0 && height > 0 {
            geometry.width = width;
            geometry.height = height;
        }
        geometry.format = format;
    }
}

impl PartialEq for NativeWindow {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for NativeWindow {}

impl fmt::Debug for NativeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let geometry = self.geometry();
        f.debug_struct("NativeWindow")
            .field("id", &self.inner.id)
            .field("width", &geometry.width)
            .field("height", &geometry.height)
            .finish()
    }
}
