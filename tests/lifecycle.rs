//! End-to-end lifecycle through the public API: a hand-written handler loop
//! and the demo engine, both driven from the callback side.

use native_app_glue::config::{Config, GlueConfig};
use native_app_glue::engine::graphics::HeadlessGraphics;
use native_app_glue::engine::sensor::SimulatedSensors;
use native_app_glue::engine::{Engine, SavedState};
use native_app_glue::input::{HostInputQueue, InputEvent, InputQueue, MotionAction};
use native_app_glue::window::NativeWindow;
use native_app_glue::{ActivityGlue, ActivityState, App, AppCommand, AppHandler, PollEvent};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Seen {
    commands: Vec<AppCommand>,
    touches: usize,
}

struct Recorder(Arc<Mutex<Seen>>);

impl AppHandler for Recorder {
    fn handle_command(&mut self, _app: &mut App, cmd: AppCommand) {
        self.0.lock().unwrap().commands.push(cmd);
    }

    fn handle_input(&mut self, _app: &mut App, event: &InputEvent) -> bool {
        if let InputEvent::Motion(_) = event {
            self.0.lock().unwrap().touches += 1;
            return true;
        }
        false
    }
}

fn handler_loop(app: &mut App, handler: &mut Recorder) -> anyhow::Result<()> {
    while !app.destroy_requested() {
        if let PollEvent::Ready {
            source: Some(source),
            ..
        } = app.poll_once(None)?
        {
            source.process(app, handler);
        }
    }
    Ok(())
}

#[test_log::test]
fn handler_sees_every_command_in_order() {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let thread_seen = seen.clone();
    let glue = ActivityGlue::create(&GlueConfig::default(), None, move |app| {
        handler_loop(app, &mut Recorder(thread_seen))
    })
    .unwrap();

    let queue = Arc::new(HostInputQueue::new().unwrap());
    let input: Arc<dyn InputQueue> = queue.clone();
    let window = NativeWindow::new(16, 16);

    glue.on_start();
    glue.on_resume();
    glue.on_input_queue_created(input.clone());
    glue.on_window_created(window.clone());
    glue.on_window_focus_changed(true);
    queue
        .push(InputEvent::touch(MotionAction::Down, 1.0, 1.0))
        .unwrap();
    glue.on_window_focus_changed(false);
    glue.on_pause();
    assert_eq!(glue.activity_state(), Some(ActivityState::Paused));
    assert_eq!(glue.on_save_instance_state(), None);
    glue.on_stop();
    glue.on_window_destroyed(&window);
    glue.on_input_queue_destroyed(&input);
    glue.on_destroy().unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        seen.commands,
        vec![
            AppCommand::Start,
            AppCommand::Resume,
            AppCommand::InputChanged,
            AppCommand::InitWindow,
            AppCommand::GainedFocus,
            AppCommand::LostFocus,
            AppCommand::Pause,
            AppCommand::SaveState,
            AppCommand::Stop,
            AppCommand::TermWindow,
            AppCommand::InputChanged,
            AppCommand::Destroy,
        ]
    );
    assert!(seen.touches <= 1);
}

#[test_log::test]
fn engine_survives_a_configuration_restart() {
    let config = Config::default();
    let sensors = SimulatedSensors::new(true).unwrap();
    let mut blob = None;

    for round in 0..2 {
        let graphics = HeadlessGraphics::new(Duration::from_millis(1));
        let thread_graphics = graphics.clone();
        let thread_sensors = sensors.clone();
        let engine_config = config.engine.clone();
        let glue = ActivityGlue::create(&config.glue, blob.take(), move |app| {
            let mut engine = Engine::new(
                app,
                &engine_config,
                Box::new(thread_graphics),
                &thread_sensors,
            )?;
            engine.run(app)
        })
        .unwrap();

        let queue = Arc::new(HostInputQueue::new().unwrap());
        let input: Arc<dyn InputQueue> = queue.clone();
        let window = NativeWindow::new(100, 200);
        glue.on_start();
        glue.on_resume();
        glue.on_input_queue_created(input.clone());
        glue.on_window_created(window.clone());
        glue.on_window_redraw_needed(&window);
        if round == 0 {
            queue
                .push(InputEvent::touch(MotionAction::Up, 42.0, 84.0))
                .unwrap();
            for _ in 0..500 {
                if !queue.finished().is_empty() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        glue.on_pause();
        blob = glue.on_save_instance_state();
        glue.on_stop();
        glue.on_window_destroyed(&window);
        glue.on_input_queue_destroyed(&input);
        glue.on_destroy().unwrap();

        let log = graphics.frame_log();
        assert!(log.frames >= 1, "round {} drew nothing", round);
        assert_eq!(log.bound_window, None);

        let state = SavedState::from_bytes(blob.as_deref().unwrap()).unwrap();
        assert_eq!((state.x, state.y), (42, 84));
    }
}
