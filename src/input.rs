// src/input.rs

//! Input events and the input queue the platform attaches to the looper.

use crate::os::pipe::Pipe;
use anyhow::Result;
use log::{trace, warn};
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionAction {
    Down,
    Up,
    Move,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

/// A touch or pointer event. Coordinates are for the first pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionEvent {
    pub action: MotionAction,
    pub x: f32,
    pub y: f32,
    pub pointer_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub action: KeyAction,
    pub key_code: i32,
    pub meta_state: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Motion(MotionEvent),
    Key(KeyEvent),
}

impl InputEvent {
    /// Single-pointer motion event.
    pub fn touch(action: MotionAction, x: f32, y: f32) -> Self {
        InputEvent::Motion(MotionEvent {
            action,
            x,
            y,
            pointer_count: 1,
        })
    }

    pub fn key(action: KeyAction, key_code: i32) -> Self {
        InputEvent::Key(KeyEvent {
            action,
            key_code,
            meta_state: 0,
        })
    }
}

/// A queue of input events, readable through a pollable descriptor.
///
/// Every event taken with `get_event` must be passed back through either
/// `pre_dispatch` returning `true` or `finish_event`.
pub trait InputQueue: Send + Sync + fmt::Debug {
    /// Descriptor that is readable while events are pending.
    fn fd(&self) -> RawFd;

    fn get_event(&self) -> Option<InputEvent>;

    /// Offers the event to the input method first. `true` means it was
    /// consumed there and must not be dispatched to the application.
    fn pre_dispatch(&self, event: &InputEvent) -> bool;

    fn finish_event(&self, event: InputEvent, handled: bool);
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<InputEvent>,
    finished: Vec<(InputEvent, bool)>,
    predispatched: Vec<InputEvent>,
}

/// Host input queue: events pushed by the platform side are signaled by one
/// byte each on an internal pipe.
#[derive(Debug)]
pub struct HostInputQueue {
    state: Mutex<QueueState>,
    reader: File,
    writer: File,
    ime_consumes_keys: AtomicBool,
}

impl HostInputQueue {
    pub fn new() -> Result<Self> {
        let Pipe { reader, writer } = Pipe::new()?;
        Ok(Self {
            state: Mutex::new(QueueState::default()),
            reader,
            writer,
            ime_consumes_keys: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Platform side: enqueue an event.
    ///
    /// The readiness byte is written with the queue unlocked, so a full pipe
    /// never keeps the consumer from draining.
    pub fn push(&self, event: InputEvent) -> Result<()> {
        self.lock().pending.push_back(event);
        if let Err(e) = (&self.writer).write_all(&[1]) {
            self.lock().pending.pop_back();
            return Err(e.into());
        }
        trace!("HostInputQueue: pushed {:?}", event);
        Ok(())
    }

    /// When set, key events are consumed by `pre_dispatch`.
    pub fn set_ime_consumes_keys(&self, consume: bool) {
        self.ime_consumes_keys.store(consume, Ordering::Release);
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Events finished so far with their handled flag.
    pub fn finished(&self) -> Vec<(InputEvent, bool)> {
        self.lock().finished.clone()
    }

    pub fn predispatched(&self) -> Vec<InputEvent> {
        self.lock().predispatched.clone()
    }
}

impl InputQueue for HostInputQueue {
    fn fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }

    fn get_event(&self) -> Option<InputEvent> {
        let mut state = self.lock();
        let event = state.pending.pop_front()?;
        let mut byte = [0u8; 1];
        if let Err(e) = (&self.reader).read_exact(&mut byte) {
            warn!("HostInputQueue: failed to consume readiness byte: {}", e);
        }
        Some(event)
    }

    fn pre_dispatch(&self, event: &InputEvent) -> bool {
        if matches!(event, InputEvent::Key(_)) && self.ime_consumes_keys.load(Ordering::Acquire) {
            self.lock().predispatched.push(*event);
            return true;
        }
        false
    }

    fn finish_event(&self, event: InputEvent, handled: bool) {
        self.lock().finished.push((event, handled));
    }
}
