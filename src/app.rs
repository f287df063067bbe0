// src/app.rs

//! The application thread's view of the activity.
//!
//! `App` owns the looper and the reading end of the command pipe, and keeps
//! its own copies of the window, input queue, content rect and configuration
//! that it adopts from [`SharedState`] while pre-processing commands. Those
//! copies are only touched on the application thread; everything the
//! callback thread reads goes through the shared lock.

use crate::channel::CommandReceiver;
use crate::command::{ActivityState, AppCommand};
use crate::device::DeviceConfiguration;
use crate::handler::AppHandler;
use crate::input::InputQueue;
use crate::looper::{Looper, LooperEvents, LooperWaker, PollEvent};
use crate::poll_source::{PollSource, LOOPER_ID_INPUT, LOOPER_ID_MAIN};
use crate::state::{Shared, SharedState};
use crate::window::{NativeWindow, Rect};
use anyhow::{Context, Result};
use log::*;
use std::os::unix::io::AsRawFd;
use std::sync::{Arc, MutexGuard};
use std::time::Duration;

pub struct App {
    shared: Arc<Shared>,
    commands: CommandReceiver,
    looper: Looper,
    window: Option<NativeWindow>,
    input_queue: Option<Arc<dyn InputQueue>>,
    content_rect: Rect,
    configuration: DeviceConfiguration,
    activity_state: Option<ActivityState>,
    destroy_requested: bool,
}

impl App {
    /// Registers the command pipe with `looper` under [`LOOPER_ID_MAIN`].
    pub(crate) fn new(
        shared: Arc<Shared>,
        commands: CommandReceiver,
        mut looper: Looper,
    ) -> Result<Self> {
        looper
            .add_fd(
                commands.as_raw_fd(),
                LOOPER_ID_MAIN,
                LooperEvents::INPUT,
                Some(PollSource::Command),
            )
            .context("Failed to register command pipe with looper")?;
        let configuration = shared.lock().pending_configuration.clone();
        Ok(Self {
            shared,
            commands,
            looper,
            window: None,
            input_queue: None,
            content_rect: Rect::default(),
            configuration,
            activity_state: None,
            destroy_requested: false,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.shared.lock()
    }

    pub fn window(&self) -> Option<&NativeWindow> {
        self.window.as_ref()
    }

    pub fn input_queue(&self) -> Option<&Arc<dyn InputQueue>> {
        self.input_queue.as_ref()
    }

    pub fn content_rect(&self) -> Rect {
        self.content_rect
    }

    pub fn configuration(&self) -> &DeviceConfiguration {
        &self.configuration
    }

    pub fn activity_state(&self) -> Option<ActivityState> {
        self.activity_state
    }

    /// Set once `Destroy` has been pre-processed. The application loop
    /// should return soon after.
    pub fn destroy_requested(&self) -> bool {
        self.destroy_requested
    }

    /// The saved-state blob currently held: the one passed at creation
    /// until the first `Resume` completes, or the one produced during
    /// `SaveState` until the platform takes it.
    pub fn saved_state(&self) -> Option<Vec<u8>> {
        self.lock().saved_state.clone()
    }

    /// Stores the blob to hand to the platform. Call while handling
    /// `SaveState`.
    pub fn set_saved_state(&mut self, blob: Vec<u8>) {
        trace!("App: saved state set ({} bytes)", blob.len());
        self.lock().saved_state = Some(blob);
    }

    pub fn looper(&mut self) -> &mut Looper {
        &mut self.looper
    }

    pub fn waker(&self) -> LooperWaker {
        self.looper.waker()
    }

    pub fn poll_once(&mut self, timeout: Option<Duration>) -> Result<PollEvent> {
        self.looper.poll_once(timeout)
    }

    /// Blocks for the next command on the pipe. A framing error aborts.
    pub fn read_command(&mut self) -> AppCommand {
        self.commands.read_command()
    }

    /// Applies the side effects `cmd` needs before the handler sees it.
    pub fn pre_exec_command(&mut self, cmd: AppCommand) {
        debug!("App: pre-exec {:?}", cmd);
        match cmd {
            AppCommand::InputChanged => {
                let pending = self.lock().pending_input_queue.clone();
                self.swap_input_queue(pending);
            }
            AppCommand::InitWindow => {
                let mut state = self.shared.lock();
                state.window = state.pending_window.clone();
                self.window = state.window.clone();
            }
            AppCommand::WindowResized | AppCommand::WindowRedrawNeeded => {
                self.lock().redraw_needed = false;
            }
            AppCommand::ContentRectChanged => {
                self.content_rect = self.shared.lock().pending_content_rect;
            }
            AppCommand::ConfigChanged => {
                self.configuration = self.shared.lock().pending_configuration.clone();
                debug!("App: configuration now {}", self.configuration);
            }
            AppCommand::Start | AppCommand::Resume | AppCommand::Pause | AppCommand::Stop => {
                self.activity_state = ActivityState::from_command(cmd);
                self.shared.lock().activity_state = self.activity_state;
            }
            AppCommand::SaveState => {
                if self.lock().saved_state.take().is_some() {
                    trace!("App: released previous saved state");
                }
            }
            AppCommand::Destroy => {
                self.destroy_requested = true;
            }
            AppCommand::TermWindow
            | AppCommand::GainedFocus
            | AppCommand::LostFocus
            | AppCommand::LowMemory => {}
        }
        self.shared.broadcast();
    }

    /// Applies the side effects `cmd` needs after the handler ran, then
    /// acknowledges it to the callback thread.
    pub fn post_exec_command(&mut self, cmd: AppCommand) {
        debug!("App: post-exec {:?}", cmd);
        let mut state = self.shared.lock();
        match cmd {
            AppCommand::TermWindow => {
                self.window = None;
                state.window = None;
            }
            AppCommand::SaveState => {
                state.state_saved = true;
            }
            AppCommand::Resume => {
                if state.saved_state.take().is_some() {
                    trace!("App: released saved state after resume");
                }
            }
            _ => {}
        }
        state.acknowledged += 1;
        drop(state);
        self.shared.broadcast();
    }

    pub(crate) fn process_command<H: AppHandler + ?Sized>(&mut self, handler: &mut H) {
        let cmd = self.read_command();
        self.pre_exec_command(cmd);
        handler.handle_command(self, cmd);
        self.post_exec_command(cmd);
    }

    pub(crate) fn process_input<H: AppHandler + ?Sized>(&mut self, handler: &mut H) {
        let Some(queue) = self.input_queue.clone() else {
            return;
        };
        while let Some(event) = queue.get_event() {
            trace!("App: input event {:?}", event);
            if queue.pre_dispatch(&event) {
                continue;
            }
            let handled = handler.handle_input(self, &event);
            queue.finish_event(event, handled);
        }
    }

    fn swap_input_queue(&mut self, next: Option<Arc<dyn InputQueue>>) {
        if let Some(old) = self.input_queue.take() {
            if let Err(e) = self.looper.remove_fd(old.fd()) {
                warn!("App: failed to detach input queue: {:#}", e);
            }
        }
        if let Some(queue) = &next {
            if let Err(e) = self.looper.add_fd(
                queue.fd(),
                LOOPER_ID_INPUT,
                LooperEvents::INPUT,
                Some(PollSource::Input),
            ) {
                warn!("App: failed to attach input queue: {:#}", e);
            }
        }
        self.input_queue = next;
    }

    /// Final teardown on the application thread once the main function
    /// returned.
    pub(crate) fn detach(&mut self) {
        self.swap_input_queue(None);
    }
}
