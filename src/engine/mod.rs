// src/engine/mod.rs

//! Demo application: a full-window color that cycles while animating, tinted
//! by the last touch position, with accelerometer samples logged while the
//! window has focus.

pub mod graphics;
pub mod sensor;

use crate::app::App;
use crate::command::AppCommand;
use crate::config::EngineConfig;
use crate::handler::AppHandler;
use crate::input::InputEvent;
use crate::looper::PollEvent;
use crate::poll_source::LOOPER_ID_USER;
use anyhow::{Context, Result};
use graphics::{GraphicsBackend, SurfaceInfo};
use log::*;
use sensor::{Sensor, SensorEventQueue, SensorKind, SensorManager};
use std::time::Duration;

/// State persisted across activity instances.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SavedState {
    pub angle: f32,
    pub x: i32,
    pub y: i32,
}

impl SavedState {
    pub const ENCODED_LEN: usize = 12;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::ENCODED_LEN);
        bytes.extend_from_slice(&self.angle.to_le_bytes());
        bytes.extend_from_slice(&self.x.to_le_bytes());
        bytes.extend_from_slice(&self.y.to_le_bytes());
        bytes
    }

    /// Decodes a blob written by [`SavedState::to_bytes`]. Any other length
    /// is rejected.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            warn!(
                "Ignoring saved state of {} bytes (expected {})",
                bytes.len(),
                Self::ENCODED_LEN
            );
            return None;
        }
        let word = |i: usize| -> [u8; 4] {
            let mut w = [0u8; 4];
            w.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
            w
        };
        Some(Self {
            angle: f32::from_le_bytes(word(0)),
            x: i32::from_le_bytes(word(1)),
            y: i32::from_le_bytes(word(2)),
        })
    }
}

pub struct Engine {
    graphics: Box<dyn GraphicsBackend>,
    surface: Option<SurfaceInfo>,
    accelerometer: Option<Sensor>,
    sensor_queue: Box<dyn SensorEventQueue>,
    sensor_period: Duration,
    angle_step: f32,
    state: SavedState,
    animating: bool,
}

impl Engine {
    /// Sets up sensors on `app`'s looper and restores any saved state the
    /// activity was created with.
    pub fn new(
        app: &mut App,
        config: &EngineConfig,
        graphics: Box<dyn GraphicsBackend>,
        sensors: &dyn SensorManager,
    ) -> Result<Self> {
        let accelerometer = sensors.default_sensor(SensorKind::Accelerometer);
        match &accelerometer {
            Some(sensor) => info!("Engine: using {}", sensor.name),
            None => debug!("Engine: no accelerometer"),
        }
        let sensor_queue = sensors
            .create_event_queue(app.looper(), LOOPER_ID_USER)
            .context("Failed to create sensor event queue")?;

        let state = app
            .saved_state()
            .and_then(|blob| SavedState::from_bytes(&blob))
            .unwrap_or_default();
        if state != SavedState::default() {
            info!("Engine: restored {:?}", state);
        }

        Ok(Self {
            graphics,
            surface: None,
            accelerometer,
            sensor_queue,
            sensor_period: config.sensor_period(),
            angle_step: config.angle_step,
            state,
            animating: true,
        })
    }

    pub fn state(&self) -> SavedState {
        self.state
    }

    pub fn is_animating(&self) -> bool {
        self.animating
    }

    pub fn has_display(&self) -> bool {
        self.surface.is_some()
    }

    fn init_display(&mut self, app: &App) {
        let Some(window) = app.window() else {
            return;
        };
        match self.graphics.init_display(window) {
            Ok(surface) => {
                debug!("Engine: display {}x{}", surface.width, surface.height);
                self.surface = Some(surface);
                // A fresh surface starts the animation over; the touch point is kept.
                self.state.angle = 0.0;
            }
            Err(e) => warn!("Engine: display initialization failed: {:#}", e),
        }
    }

    fn term_display(&mut self) {
        if self.surface.take().is_some() {
            self.graphics.terminate();
        }
        self.animating = false;
    }

    fn draw_frame(&mut self) {
        let Some(surface) = self.surface else {
            return;
        };
        let color = [
            self.state.x as f32 / surface.width.max(1) as f32,
            self.state.angle,
            self.state.y as f32 / surface.height.max(1) as f32,
            1.0,
        ];
        if let Err(e) = self.graphics.present(color) {
            warn!("Engine: present failed: {:#}", e);
        }
    }

    fn advance(&mut self) {
        self.state.angle += self.angle_step;
        if self.state.angle > 1.0 {
            self.state.angle = 0.0;
        }
    }

    fn drain_sensor_events(&mut self) {
        if self.accelerometer.is_none() {
            return;
        }
        while let Some(event) = self.sensor_queue.next_event() {
            info!(
                "accelerometer: x={:.6} y={:.6} z={:.6}",
                event.x, event.y, event.z
            );
        }
    }

    fn set_accelerometer(&mut self, enabled: bool) {
        let Some(sensor) = &self.accelerometer else {
            return;
        };
        let result = if enabled {
            self.sensor_queue
                .enable_sensor(sensor)
                .and_then(|()| self.sensor_queue.set_event_rate(sensor, self.sensor_period))
        } else {
            self.sensor_queue.disable_sensor(sensor)
        };
        if let Err(e) = result {
            warn!("Engine: accelerometer update failed: {:#}", e);
        }
    }

    /// Runs until the activity is destroyed.
    pub fn run(&mut self, app: &mut App) -> Result<()> {
        loop {
            loop {
                let timeout = if self.animating {
                    Some(Duration::ZERO)
                } else {
                    None
                };
                let ident = match app.poll_once(timeout)? {
                    PollEvent::Ready { ident, source, .. } => {
                        if let Some(source) = source {
                            source.process(app, self);
                        }
                        ident
                    }
                    PollEvent::Wake | PollEvent::Timeout => break,
                };

                if ident == LOOPER_ID_USER {
                    self.drain_sensor_events();
                }

                if app.destroy_requested() {
                    self.term_display();
                    info!("Engine: destroy requested, leaving main loop");
                    return Ok(());
                }
            }

            if self.animating {
                self.advance();
                self.draw_frame();
            }
        }
    }
}

impl AppHandler for Engine {
    fn handle_command(&mut self, app: &mut App, cmd: AppCommand) {
        match cmd {
            AppCommand::SaveState => {
                app.set_saved_state(self.state.to_bytes());
            }
            AppCommand::InitWindow => {
                if app.window().is_some() {
                    self.init_display(app);
                    self.draw_frame();
                }
            }
            AppCommand::TermWindow => self.term_display(),
            AppCommand::GainedFocus => {
                self.set_accelerometer(true);
                // Resumes animation even without an accelerometer.
                self.animating = true;
                debug!("Engine: focus gained, animation resumed");
            }
            AppCommand::LostFocus => {
                self.set_accelerometer(false);
                self.animating = false;
                self.draw_frame();
            }
            _ => {}
        }
    }

    fn handle_input(&mut self, _app: &mut App, event: &InputEvent) -> bool {
        match event {
            InputEvent::Motion(motion) => {
                self.state.x = motion.x as i32;
                self.state.y = motion.y as i32;
                true
            }
            InputEvent::Key(_) => false,
        }
    }
}
