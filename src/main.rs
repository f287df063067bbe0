// src/main.rs

//! Host simulation: plays the platform's part and drives the demo engine
//! through a full activity lifecycle, then recreates it from the saved
//! state.

use anyhow::{Context, Result};
use log::{debug, info};
use native_app_glue::config::{Config, CONFIG};
use native_app_glue::device::{DeviceConfiguration, Orientation};
use native_app_glue::engine::graphics::HeadlessGraphics;
use native_app_glue::engine::sensor::{SensorEvent, SimulatedSensors};
use native_app_glue::engine::{Engine, SavedState};
use native_app_glue::input::{HostInputQueue, InputEvent, InputQueue, KeyAction, MotionAction};
use native_app_glue::window::{NativeWindow, Rect};
use native_app_glue::ActivityGlue;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WINDOW_WIDTH: i32 = 1080;
const WINDOW_HEIGHT: i32 = 1920;

fn launch(
    config: &Config,
    graphics: &HeadlessGraphics,
    sensors: &SimulatedSensors,
    saved_state: Option<Vec<u8>>,
) -> Result<ActivityGlue> {
    let engine_config = config.engine.clone();
    let graphics = graphics.clone();
    let sensors = sensors.clone();
    ActivityGlue::create(&config.glue, saved_state, move |app| {
        let mut engine = Engine::new(app, &engine_config, Box::new(graphics), &sensors)?;
        engine.run(app)
    })
    .context("Failed to create activity")
}

/// Runs one full foreground session and returns the saved-state blob.
fn first_session(config: &Config, sensors: &SimulatedSensors) -> Result<Option<Vec<u8>>> {
    let graphics = HeadlessGraphics::new(Duration::from_millis(config.engine.frame_interval_ms));
    let glue = launch(config, &graphics, sensors, None)?;
    let feed = sensors.feed();

    glue.on_start();
    glue.on_resume();

    let queue = Arc::new(HostInputQueue::new()?);
    let input: Arc<dyn InputQueue> = queue.clone();
    glue.on_input_queue_created(input.clone());

    let window = NativeWindow::new(WINDOW_WIDTH, WINDOW_HEIGHT);
    glue.on_window_created(window.clone());
    glue.on_window_focus_changed(true);
    glue.on_content_rect_changed(Rect::new(0, 96, WINDOW_WIDTH, WINDOW_HEIGHT));

    for i in 0..5 {
        feed.push(SensorEvent {
            x: 0.1 * i as f32,
            y: -0.2,
            z: 9.81,
        })?;
    }
    queue.push(InputEvent::touch(MotionAction::Down, 540.0, 960.0))?;
    queue.push(InputEvent::touch(MotionAction::Move, 700.0, 1200.0))?;
    queue.push(InputEvent::key(KeyAction::Down, 4))?;
    thread::sleep(Duration::from_millis(100));

    glue.on_configuration_changed(DeviceConfiguration {
        orientation: Orientation::Landscape,
        screen_width_dp: 640,
        screen_height_dp: 360,
        ..DeviceConfiguration::default()
    });
    window.resize(WINDOW_HEIGHT, WINDOW_WIDTH);
    glue.on_window_resized(&window);
    glue.on_window_redraw_needed(&window);
    glue.on_low_memory();

    glue.on_window_focus_changed(false);
    glue.on_pause();
    let blob = glue.on_save_instance_state();
    glue.on_stop();
    glue.on_window_destroyed(&window);
    glue.on_input_queue_destroyed(&input);

    debug!("Channel bytes written: {}", glue.channel_counters().written());
    glue.on_destroy()?;

    let log = graphics.frame_log();
    info!(
        "First session: {} frames, {} touches handled, {} sensor samples dropped",
        log.frames,
        queue.finished().iter().filter(|(_, handled)| *handled).count(),
        feed.dropped()
    );
    Ok(blob)
}

fn main() -> Result<()> {
    let config: Config = (*CONFIG).clone();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.filter.as_str()),
    )
    .format_timestamp_micros()
    .init();

    info!("Starting native-app-glue host simulation");
    debug!("Configuration: {:?}", config);

    let sensors = SimulatedSensors::new(true).context("Failed to set up sensors")?;
    let blob = first_session(&config, &sensors)?;
    match blob.as_deref().and_then(SavedState::from_bytes) {
        Some(state) => info!("Saved state: {:?}", state),
        None => info!("No saved state produced"),
    }

    let graphics = HeadlessGraphics::new(Duration::from_millis(config.engine.frame_interval_ms));
    let glue = launch(&config, &graphics, &sensors, blob)?;
    glue.on_start();
    glue.on_pause();
    if let Some(state) = glue
        .on_save_instance_state()
        .as_deref()
        .and_then(SavedState::from_bytes)
    {
        info!("Recreated activity restored touch at ({}, {})", state.x, state.y);
    }
    glue.on_stop();
    glue.on_destroy()?;

    info!("Host simulation finished");
    Ok(())
}
