// src/activity/tests.rs

use super::*;
use crate::device::Orientation;
use crate::handler::AppHandler;
use crate::looper::PollEvent;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Mutex;
use std::time::Instant;
use test_log::test;

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    cmd: AppCommand,
    window: Option<u64>,
    content_rect: Rect,
    activity_state: Option<ActivityState>,
}

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<Entry>>>);

impl Journal {
    fn commands(&self) -> Vec<AppCommand> {
        self.0.lock().unwrap().iter().map(|e| e.cmd).collect()
    }

    fn entries(&self) -> Vec<Entry> {
        self.0.lock().unwrap().clone()
    }
}

/// Records every command, optionally sleeping on one of them before
/// raising `finished`.
struct RecordingHandler {
    journal: Journal,
    slow_command: Option<(AppCommand, Duration, Arc<AtomicBool>)>,
    blob: Vec<u8>,
}

impl RecordingHandler {
    fn new(journal: Journal) -> Self {
        Self {
            journal,
            slow_command: None,
            blob: Vec::new(),
        }
    }
}

impl AppHandler for RecordingHandler {
    fn handle_command(&mut self, app: &mut App, cmd: AppCommand) {
        if cmd == AppCommand::SaveState && !self.blob.is_empty() {
            app.set_saved_state(self.blob.clone());
        }
        if let Some((slow, delay, finished)) = &self.slow_command {
            if *slow == cmd {
                thread::sleep(*delay);
                finished.store(true, Ordering::SeqCst);
            }
        }
        self.journal.0.lock().unwrap().push(Entry {
            cmd,
            window: app.window().map(NativeWindow::id),
            content_rect: app.content_rect(),
            activity_state: app.activity_state(),
        });
    }
}

fn run_loop<H: AppHandler>(app: &mut App, handler: &mut H) -> Result<()> {
    loop {
        if let PollEvent::Ready {
            source: Some(source),
            ..
        } = app.poll_once(None)?
        {
            source.process(app, handler);
        }
        if app.destroy_requested() {
            return Ok(());
        }
    }
}

fn spawn_recording(journal: &Journal) -> ActivityGlue {
    let mut handler = RecordingHandler::new(journal.clone());
    ActivityGlue::create(&GlueConfig::default(), None, move |app| {
        run_loop(app, &mut handler)
    })
    .unwrap()
}

#[test]
fn create_blocks_until_running_and_destroy_joins() {
    let journal = Journal::default();
    let glue = spawn_recording(&journal);
    assert!(!glue.is_destroyed());
    glue.on_destroy().unwrap();
    assert_eq!(journal.commands(), vec![AppCommand::Destroy]);
}

#[test]
fn pause_returns_only_after_the_handler_finished() {
    let journal = Journal::default();
    let finished = Arc::new(AtomicBool::new(false));
    let mut handler = RecordingHandler::new(journal.clone());
    handler.slow_command = Some((
        AppCommand::Pause,
        Duration::from_millis(50),
        finished.clone(),
    ));
    let glue = ActivityGlue::create(&GlueConfig::default(), None, move |app| {
        run_loop(app, &mut handler)
    })
    .unwrap();

    glue.on_start();
    glue.on_resume();
    glue.on_pause();
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(glue.activity_state(), Some(ActivityState::Paused));
    glue.on_destroy().unwrap();
}

#[test]
fn hand_off_commands_wait_for_post_processing() {
    for slow in [
        AppCommand::WindowResized,
        AppCommand::WindowRedrawNeeded,
        AppCommand::TermWindow,
        AppCommand::InputChanged,
        AppCommand::SaveState,
    ] {
        let journal = Journal::default();
        let finished = Arc::new(AtomicBool::new(false));
        let mut handler = RecordingHandler::new(journal.clone());
        handler.slow_command = Some((slow, Duration::from_millis(30), finished.clone()));
        let glue = ActivityGlue::create(&GlueConfig::default(), None, move |app| {
            run_loop(app, &mut handler)
        })
        .unwrap();

        let window = NativeWindow::new(320, 240);
        let queue: Arc<dyn InputQueue> = Arc::new(crate::input::HostInputQueue::new().unwrap());
        glue.on_window_created(window.clone());
        match slow {
            AppCommand::WindowResized => glue.on_window_resized(&window),
            AppCommand::WindowRedrawNeeded => glue.on_window_redraw_needed(&window),
            AppCommand::TermWindow => glue.on_window_destroyed(&window),
            AppCommand::InputChanged => glue.on_input_queue_created(queue),
            AppCommand::SaveState => assert_eq!(glue.on_save_instance_state(), None),
            _ => unreachable!(),
        }
        assert!(
            finished.load(Ordering::SeqCst),
            "{:?} returned before the handler finished",
            slow
        );
        glue.on_destroy().unwrap();
    }
}

#[test]
fn window_is_gone_once_window_destroyed_returns() {
    let journal = Journal::default();
    let glue = spawn_recording(&journal);
    let window = NativeWindow::new(800, 600);

    glue.on_window_created(window.clone());
    glue.on_window_destroyed(&window);
    assert!(glue.window().is_none());

    let entries = journal.entries();
    assert_eq!(entries[0].cmd, AppCommand::InitWindow);
    assert_eq!(entries[0].window, Some(window.id()));
    assert_eq!(entries[1].cmd, AppCommand::TermWindow);
    assert_eq!(entries[1].window, Some(window.id()));
    glue.on_destroy().unwrap();
}

#[test]
fn replacing_a_pending_window_terminates_the_old_one_first() {
    let journal = Journal::default();
    let glue = spawn_recording(&journal);
    let first = NativeWindow::new(100, 100);
    let second = NativeWindow::new(200, 200);

    glue.on_window_created(first.clone());
    glue.on_window_created(second.clone());
    glue.on_pause();

    let windows: Vec<_> = journal
        .entries()
        .into_iter()
        .filter(|e| e.cmd != AppCommand::Pause)
        .map(|e| (e.cmd, e.window))
        .collect();
    assert_eq!(
        windows,
        vec![
            (AppCommand::InitWindow, Some(first.id())),
            (AppCommand::TermWindow, Some(first.id())),
            (AppCommand::InitWindow, Some(second.id())),
        ]
    );
    assert_eq!(glue.window(), Some(second));
    glue.on_destroy().unwrap();
}

#[test]
fn saved_state_survives_recreation_bit_for_bit() {
    let blob: Vec<u8> = (0u8..=255).rev().collect();

    let journal = Journal::default();
    let mut handler = RecordingHandler::new(journal.clone());
    handler.blob = blob.clone();
    let glue = ActivityGlue::create(&GlueConfig::default(), None, move |app| {
        run_loop(app, &mut handler)
    })
    .unwrap();
    glue.on_pause();
    let saved = glue.on_save_instance_state();
    glue.on_stop();
    glue.on_destroy().unwrap();
    assert_eq!(saved.as_deref(), Some(blob.as_slice()));

    let (tx, rx) = mpsc::channel();
    let mut handler = RecordingHandler::new(Journal::default());
    let glue = ActivityGlue::create(&GlueConfig::default(), saved, move |app| {
        tx.send(app.saved_state()).unwrap();
        run_loop(app, &mut handler)
    })
    .unwrap();
    assert_eq!(rx.recv().unwrap(), Some(blob));
    glue.on_destroy().unwrap();
}

#[test]
fn save_without_blob_returns_none() {
    let journal = Journal::default();
    let glue = spawn_recording(&journal);
    assert_eq!(glue.on_save_instance_state(), None);
    assert_eq!(journal.commands(), vec![AppCommand::SaveState]);
    glue.on_destroy().unwrap();
}

#[test]
fn initial_blob_is_released_after_first_resume() {
    let (tx, rx) = mpsc::channel();
    struct BlobWatcher(mpsc::Sender<(AppCommand, Option<Vec<u8>>)>);
    impl AppHandler for BlobWatcher {
        fn handle_command(&mut self, app: &mut App, cmd: AppCommand) {
            self.0.send((cmd, app.saved_state())).unwrap();
        }
    }
    let mut watcher = BlobWatcher(tx);
    let glue = ActivityGlue::create(&GlueConfig::default(), Some(vec![5, 6]), move |app| {
        run_loop(app, &mut watcher)
    })
    .unwrap();
    glue.on_start();
    glue.on_resume();
    glue.on_pause();
    assert_eq!(rx.recv().unwrap(), (AppCommand::Start, Some(vec![5, 6])));
    assert_eq!(rx.recv().unwrap(), (AppCommand::Resume, Some(vec![5, 6])));
    assert_eq!(rx.recv().unwrap(), (AppCommand::Pause, None));
    glue.on_destroy().unwrap();
}

#[test]
fn every_written_command_is_read_exactly_once() {
    const N: usize = 500;
    let journal = Journal::default();
    let glue = spawn_recording(&journal);
    for i in 0..N {
        match i % 4 {
            0 => glue.on_window_focus_changed(true),
            1 => glue.on_low_memory(),
            2 => glue.on_content_rect_changed(Rect::new(0, 0, i as i32, i as i32)),
            _ => glue.on_window_focus_changed(false),
        }
    }
    let counters = glue.channel_counters();
    glue.on_destroy().unwrap();

    let commands = journal.commands();
    assert_eq!(commands.len(), N + 1);
    assert_eq!(counters.written(), (N + 1) as u64);
    assert_eq!(counters.read(), (N + 1) as u64);
    for (i, cmd) in commands.iter().take(N).enumerate() {
        let expected = match i % 4 {
            0 => AppCommand::GainedFocus,
            1 => AppCommand::LowMemory,
            2 => AppCommand::ContentRectChanged,
            _ => AppCommand::LostFocus,
        };
        assert_eq!(*cmd, expected, "command {} out of order", i);
    }
}

#[test]
fn content_rect_and_configuration_are_adopted_before_the_handler_runs() {
    let journal = Journal::default();
    let (tx, rx) = mpsc::channel();
    struct ConfigWatcher(RecordingHandler, mpsc::Sender<DeviceConfiguration>);
    impl AppHandler for ConfigWatcher {
        fn handle_command(&mut self, app: &mut App, cmd: AppCommand) {
            if cmd == AppCommand::ConfigChanged {
                self.1.send(app.configuration().clone()).unwrap();
            }
            self.0.handle_command(app, cmd);
        }
    }
    let mut watcher = ConfigWatcher(RecordingHandler::new(journal.clone()), tx);
    let glue = ActivityGlue::create(&GlueConfig::default(), None, move |app| {
        run_loop(app, &mut watcher)
    })
    .unwrap();

    let rect = Rect::new(0, 48, 1080, 1920);
    glue.on_content_rect_changed(rect);
    let landscape = DeviceConfiguration {
        orientation: Orientation::Landscape,
        ..DeviceConfiguration::default()
    };
    glue.on_configuration_changed(landscape.clone());
    glue.on_pause();

    assert_eq!(journal.entries()[0].content_rect, rect);
    assert_eq!(rx.recv().unwrap(), landscape);
    glue.on_destroy().unwrap();
}

#[test]
fn commands_after_main_returned_are_dropped_without_blocking() {
    let glue = ActivityGlue::create(&GlueConfig::default(), None, |_app| Ok(())).unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while !glue.is_destroyed() {
        assert!(Instant::now() < deadline, "application thread never exited");
        thread::sleep(Duration::from_millis(1));
    }
    glue.on_pause();
    assert_eq!(glue.on_save_instance_state(), None);
    let written = glue.channel_counters().written();
    assert_eq!(written, 0);
    glue.on_destroy().unwrap();
}

#[test]
fn bounded_destroy_reports_a_stuck_application_thread() {
    let config = GlueConfig {
        destroy_timeout_ms: Some(20),
        ..GlueConfig::default()
    };
    let glue = ActivityGlue::create(&config, None, |_app| {
        thread::sleep(Duration::from_millis(300));
        Ok(())
    })
    .unwrap();

    let err = glue.on_destroy().unwrap_err();
    match err.downcast_ref::<GlueError>() {
        Some(GlueError::DestroyTimeout { waited }) => {
            assert_eq!(*waited, Duration::from_millis(20))
        }
        other => panic!("Unexpected error {:?}", other),
    }
}

#[test]
fn main_error_still_marks_the_activity_destroyed() {
    let glue = ActivityGlue::create(&GlueConfig::default(), None, |_app| {
        Err(anyhow!("engine failed to start"))
    })
    .unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while !glue.is_destroyed() {
        assert!(Instant::now() < deadline, "application thread never exited");
        thread::sleep(Duration::from_millis(1));
    }
    glue.on_destroy().unwrap();
}

#[test]
fn dropping_the_glue_shuts_the_thread_down() {
    let journal = Journal::default();
    let glue = spawn_recording(&journal);
    glue.on_start();
    drop(glue);
    assert_eq!(
        journal.commands(),
        vec![AppCommand::Start, AppCommand::Destroy]
    );
}

#[test]
fn full_pipe_does_not_block_the_application_thread() {
    // More commands than the pipe holds, so the writer blocks until the
    // application thread drains it.
    const COMMANDS: usize = 70_000;

    struct Gate {
        release: Option<mpsc::Receiver<()>>,
        handled: Arc<AtomicUsize>,
    }
    impl AppHandler for Gate {
        fn handle_command(&mut self, _app: &mut App, _cmd: AppCommand) {
            if let Some(release) = self.release.take() {
                let _ = release.recv();
            }
            self.handled.fetch_add(1, Ordering::SeqCst);
        }
    }

    let (release_tx, release_rx) = mpsc::channel();
    let handled = Arc::new(AtomicUsize::new(0));
    let mut gate = Gate {
        release: Some(release_rx),
        handled: handled.clone(),
    };
    let glue = ActivityGlue::create(&GlueConfig::default(), None, move |app| {
        run_loop(app, &mut gate)
    })
    .unwrap();

    glue.on_start();
    thread::scope(|s| {
        let flood = s.spawn(|| {
            for _ in 0..COMMANDS {
                glue.on_low_memory();
            }
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        while glue.channel_counters().written() < 60_000 {
            assert!(Instant::now() < deadline, "pipe never filled");
            thread::sleep(Duration::from_millis(1));
        }
        // The shared state stays available while the writer is blocked.
        assert!(!glue.is_destroyed());
        assert_eq!(handled.load(Ordering::SeqCst), 0);
        release_tx.send(()).unwrap();
        flood.join().unwrap();
    });

    let deadline = Instant::now() + Duration::from_secs(10);
    while handled.load(Ordering::SeqCst) < COMMANDS + 1 {
        assert!(
            Instant::now() < deadline,
            "application thread stalled after {} commands",
            handled.load(Ordering::SeqCst)
        );
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(glue.activity_state(), Some(ActivityState::Started));
    glue.on_destroy().unwrap();
    assert_eq!(handled.load(Ordering::SeqCst), COMMANDS + 2);
}
