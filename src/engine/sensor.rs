// src/engine/sensor.rs

//! Sensor access for the demo engine.
//!
//! A [`SensorManager`] hands out the default sensor of a kind, if the device
//! has one, and creates event queues whose descriptor is registered with
//! the looper under an application identifier.

use crate::looper::{Looper, LooperEvents};
use crate::os::pipe::Pipe;
use anyhow::{bail, Result};
use log::{debug, trace, warn};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Accelerometer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sensor {
    pub kind: SensorKind,
    pub name: String,
}

/// Acceleration in m/s² along the device axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorEvent {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

pub trait SensorEventQueue: Send {
    fn enable_sensor(&mut self, sensor: &Sensor) -> Result<()>;
    fn set_event_rate(&mut self, sensor: &Sensor, period: Duration) -> Result<()>;
    fn disable_sensor(&mut self, sensor: &Sensor) -> Result<()>;
    /// Next pending event, if any. Never blocks.
    fn next_event(&mut self) -> Option<SensorEvent>;
}

pub trait SensorManager {
    fn default_sensor(&self, kind: SensorKind) -> Option<Sensor>;

    /// Creates a queue and registers its descriptor with `looper` under
    /// `ident`, with no poll source attached.
    fn create_event_queue(
        &self,
        looper: &mut Looper,
        ident: i32,
    ) -> Result<Box<dyn SensorEventQueue>>;
}

#[derive(Debug, Default)]
struct FeedState {
    enabled: bool,
    enable_calls: usize,
    period: Option<Duration>,
    pending: VecDeque<SensorEvent>,
    dropped: usize,
}

#[derive(Debug)]
struct FeedInner {
    state: Mutex<FeedState>,
    reader: File,
    writer: File,
}

/// Test/host handle for injecting accelerometer samples and inspecting how
/// the queue was driven.
#[derive(Debug, Clone)]
pub struct SensorFeed {
    inner: Arc<FeedInner>,
}

impl SensorFeed {
    fn new() -> Result<Self> {
        let Pipe { reader, writer } = Pipe::new()?;
        Ok(Self {
            inner: Arc::new(FeedInner {
                state: Mutex::new(FeedState::default()),
                reader,
                writer,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers a sample. Samples arriving while the sensor is disabled are
    /// dropped, as the hardware would not produce them.
    pub fn push(&self, event: SensorEvent) -> Result<()> {
        {
            let mut state = self.lock();
            if !state.enabled {
                state.dropped += 1;
                return Ok(());
            }
            state.pending.push_back(event);
        }
        // Written unlocked; `next_event` takes the lock to drain.
        if let Err(e) = (&self.inner.writer).write_all(&[1]) {
            self.lock().pending.pop_back();
            return Err(e.into());
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    pub fn enable_calls(&self) -> usize {
        self.lock().enable_calls
    }

    pub fn period(&self) -> Option<Duration> {
        self.lock().period
    }

    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn dropped(&self) -> usize {
        self.lock().dropped
    }
}

/// Host sensor manager with an optional simulated accelerometer.
#[derive(Debug, Clone)]
pub struct SimulatedSensors {
    accelerometer: bool,
    feed: SensorFeed,
}

impl SimulatedSensors {
    pub fn new(accelerometer: bool) -> Result<Self> {
        Ok(Self {
            accelerometer,
            feed: SensorFeed::new()?,
        })
    }

    pub fn feed(&self) -> SensorFeed {
        self.feed.clone()
    }
}

impl SensorManager for SimulatedSensors {
    fn default_sensor(&self, kind: SensorKind) -> Option<Sensor> {
        match kind {
            SensorKind::Accelerometer if self.accelerometer => Some(Sensor {
                kind,
                name: "Simulated accelerometer".to_string(),
            }),
            _ => None,
        }
    }

    fn create_event_queue(
        &self,
        looper: &mut Looper,
        ident: i32,
    ) -> Result<Box<dyn SensorEventQueue>> {
        looper.add_fd(
            self.feed.inner.reader.as_raw_fd(),
            ident,
            LooperEvents::INPUT,
            None,
        )?;
        debug!("SimulatedSensors: event queue registered with ident {}", ident);
        Ok(Box::new(SimulatedQueue {
            feed: self.feed.clone(),
        }))
    }
}

struct SimulatedQueue {
    feed: SensorFeed,
}

impl SimulatedQueue {
    fn check(sensor: &Sensor) -> Result<()> {
        if sensor.kind != SensorKind::Accelerometer {
            bail!("Unsupported sensor {:?}", sensor.kind);
        }
        Ok(())
    }
}

impl SensorEventQueue for SimulatedQueue {
    fn enable_sensor(&mut self, sensor: &Sensor) -> Result<()> {
        Self::check(sensor)?;
        let mut state = self.feed.lock();
        state.enabled = true;
        state.enable_calls += 1;
        Ok(())
    }

    fn set_event_rate(&mut self, sensor: &Sensor, period: Duration) -> Result<()> {
        Self::check(sensor)?;
        self.feed.lock().period = Some(period);
        Ok(())
    }

    fn disable_sensor(&mut self, sensor: &Sensor) -> Result<()> {
        Self::check(sensor)?;
        self.feed.lock().enabled = false;
        Ok(())
    }

    fn next_event(&mut self) -> Option<SensorEvent> {
        let mut state = self.feed.lock();
        let event = state.pending.pop_front()?;
        let mut byte = [0u8; 1];
        if let Err(e) = (&self.feed.inner.reader).read_exact(&mut byte) {
            warn!("SimulatedSensors: failed to consume readiness byte: {}", e);
        }
        trace!("SimulatedSensors: delivering {:?}", event);
        Some(event)
    }
}
