// src/activity.rs

//! Lifecycle coordinator: the platform-callback side of the glue.
//!
//! [`ActivityGlue`] owns the application thread. Each `on_*` method is a
//! platform callback; it records any pending hand-off data in the shared
//! state, writes the matching command to the pipe, and for hand-off commands
//! blocks until the application thread has post-processed that command.
//! Commands are consumed in pipe order, so "post-processed" is tracked with a
//! sequence number rather than per-field predicates.
//!
//! ## Locking
//! A callback holds the writer lock for its whole duration, which keeps
//! pending fields, sequence numbers and pipe order paired. The shared state
//! lock is only held to update fields and to wait; it is always released
//! before a pipe write, since a full pipe blocks the writer until the
//! application thread, which needs the shared lock to finish its current
//! command, reads again. The application thread never takes the writer
//! lock.

use crate::app::App;
use crate::channel::{self, command_channel, ChannelCounters, CommandSender};
use crate::command::{ActivityState, AppCommand};
use crate::config::GlueConfig;
use crate::device::DeviceConfiguration;
use crate::error::GlueError;
use crate::input::InputQueue;
use crate::looper::Looper;
use crate::state::{Shared, SharedState};
use crate::window::{NativeWindow, Rect};
use anyhow::{anyhow, Context, Result};
use log::*;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Marks the activity destroyed when the application thread unwinds or
/// returns, whichever happens.
struct ExitGuard {
    shared: Arc<Shared>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.saved_state = None;
        state.destroyed = true;
        drop(state);
        self.shared.broadcast();
        debug!("Application thread marked destroyed");
    }
}

pub struct ActivityGlue {
    shared: Arc<Shared>,
    writer: Mutex<CommandSender>,
    counters: Arc<ChannelCounters>,
    thread_handle: Option<JoinHandle<()>>,
    destroy_timeout: Option<Duration>,
}

impl ActivityGlue {
    /// Spawns the application thread running `main` and blocks until it is
    /// ready to receive commands.
    ///
    /// `saved_state` is the blob returned by `on_save_instance_state` of a
    /// previous instance, if any.
    pub fn create<F>(config: &GlueConfig, saved_state: Option<Vec<u8>>, main: F) -> Result<Self>
    where
        F: FnOnce(&mut App) -> Result<()> + Send + 'static,
    {
        let (commands, receiver) = command_channel().context("Failed to create command pipe")?;
        let shared = Arc::new(Shared::new(saved_state));

        let thread_shared = shared.clone();
        let thread_handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                let looper = match Looper::prepare() {
                    Ok(looper) => looper,
                    Err(e) => {
                        error!("Failed to prepare application looper: {:#}", e);
                        let _guard = ExitGuard {
                            shared: thread_shared,
                        };
                        return;
                    }
                };
                let mut app = match App::new(thread_shared.clone(), receiver, looper) {
                    Ok(app) => app,
                    Err(e) => {
                        error!("Failed to initialize application: {:#}", e);
                        let _guard = ExitGuard {
                            shared: thread_shared,
                        };
                        return;
                    }
                };
                // Dropped before `app`, so the pipe reader outlives the
                // destroyed flag.
                let _guard = ExitGuard {
                    shared: thread_shared.clone(),
                };

                thread_shared.lock().running = true;
                thread_shared.broadcast();
                info!("Application thread running");

                if let Err(e) = main(&mut app) {
                    error!("Application main returned an error: {:#}", e);
                }
                app.detach();
                info!("Application thread exiting");
            })
            .context("Failed to spawn application thread")?;

        let mut glue = Self {
            shared,
            counters: commands.counters(),
            writer: Mutex::new(commands),
            thread_handle: Some(thread_handle),
            destroy_timeout: config.destroy_timeout(),
        };

        let state = glue
            .shared
            .wait_while(glue.shared.lock(), |s| !s.running && !s.destroyed);
        let running = state.running;
        drop(state);
        if !running {
            if let Some(handle) = glue.thread_handle.take() {
                let _ = handle.join();
            }
            return Err(GlueError::ApplicationExited.into());
        }
        info!("Activity created");
        Ok(glue)
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.shared.lock()
    }

    fn writer(&self) -> MutexGuard<'_, CommandSender> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assigns `cmd` the next sequence number, releases `state` and writes
    /// the command. Returns the sequence number, or `None` if the
    /// application thread is gone.
    fn issue(
        &self,
        writer: &CommandSender,
        mut state: MutexGuard<'_, SharedState>,
        cmd: AppCommand,
    ) -> Option<u64> {
        if state.destroyed {
            warn!("Dropping {:?}: application thread has exited", cmd);
            return None;
        }
        state.issued += 1;
        let seq = state.issued;
        drop(state);

        match writer.try_write_command(cmd) {
            Ok(()) => {
                debug!("Issued {:?} (seq {})", cmd, seq);
                Some(seq)
            }
            // The reader closes once the application thread has exited.
            Err(e) if self.is_destroyed() => {
                warn!("Dropping {:?}: application thread exited ({})", cmd, e);
                None
            }
            Err(e) => channel::fatal(e),
        }
    }

    fn await_ack(&self, seq: u64) -> MutexGuard<'_, SharedState> {
        let state = self
            .shared
            .wait_while(self.lock(), |s| s.acknowledged < seq && !s.destroyed);
        trace!("Command seq {} acknowledged", seq);
        state
    }

    fn send(&self, cmd: AppCommand) {
        let writer = self.writer();
        if let Some(seq) = self.issue(&writer, self.lock(), cmd) {
            if cmd.requires_ack() {
                drop(self.await_ack(seq));
            }
        }
    }

    pub fn on_start(&self) {
        debug!("Start");
        self.send(AppCommand::Start);
    }

    pub fn on_resume(&self) {
        debug!("Resume");
        self.send(AppCommand::Resume);
    }

    /// Blocks until the application thread has handled the pause.
    pub fn on_pause(&self) {
        debug!("Pause");
        self.send(AppCommand::Pause);
    }

    pub fn on_stop(&self) {
        debug!("Stop");
        self.send(AppCommand::Stop);
    }

    /// Asks the application thread for a saved-state blob and takes it.
    pub fn on_save_instance_state(&self) -> Option<Vec<u8>> {
        debug!("SaveInstanceState");
        let writer = self.writer();
        let mut state = self.lock();
        state.state_saved = false;
        self.issue(&writer, state, AppCommand::SaveState)?;
        let mut state = self
            .shared
            .wait_while(self.lock(), |s| !s.state_saved && !s.destroyed);
        let blob = state.saved_state.take();
        if let Some(blob) = &blob {
            debug!("Saved state taken ({} bytes)", blob.len());
        }
        blob
    }

    pub fn on_configuration_changed(&self, configuration: DeviceConfiguration) {
        debug!("ConfigurationChanged: {}", configuration);
        let writer = self.writer();
        let mut state = self.lock();
        state.pending_configuration = configuration;
        self.issue(&writer, state, AppCommand::ConfigChanged);
    }

    pub fn on_low_memory(&self) {
        debug!("LowMemory");
        self.send(AppCommand::LowMemory);
    }

    pub fn on_window_focus_changed(&self, has_focus: bool) {
        debug!("WindowFocusChanged: {}", has_focus);
        self.send(if has_focus {
            AppCommand::GainedFocus
        } else {
            AppCommand::LostFocus
        });
    }

    /// Hands a new window to the application thread. A window still pending
    /// from an earlier call is terminated first, and that termination is
    /// waited for.
    pub fn on_window_created(&self, window: NativeWindow) {
        debug!("NativeWindowCreated: {:?}", window);
        self.set_window(Some(window));
    }

    /// Returns once the application thread has stopped using the window.
    pub fn on_window_destroyed(&self, window: &NativeWindow) {
        debug!("NativeWindowDestroyed: {:?}", window);
        self.set_window(None);
    }

    fn set_window(&self, window: Option<NativeWindow>) {
        let writer = self.writer();
        let has_pending = self.lock().pending_window.is_some();
        if has_pending {
            // The old window stays pending until its termination is acked so
            // an INIT_WINDOW still in the pipe adopts the right surface.
            if let Some(seq) = self.issue(&writer, self.lock(), AppCommand::TermWindow) {
                drop(self.await_ack(seq));
            }
            self.lock().pending_window = None;
        }
        if let Some(window) = window {
            let mut state = self.lock();
            state.pending_window = Some(window);
            self.issue(&writer, state, AppCommand::InitWindow);
        }
    }

    pub fn on_window_resized(&self, window: &NativeWindow) {
        debug!("NativeWindowResized: {:?}", window);
        self.send(AppCommand::WindowResized);
    }

    /// Returns once the application thread has redrawn.
    pub fn on_window_redraw_needed(&self, window: &NativeWindow) {
        debug!("NativeWindowRedrawNeeded: {:?}", window);
        let writer = self.writer();
        let mut state = self.lock();
        state.redraw_needed = true;
        if let Some(seq) = self.issue(&writer, state, AppCommand::WindowRedrawNeeded) {
            drop(self.await_ack(seq));
        }
    }

    pub fn on_content_rect_changed(&self, rect: Rect) {
        debug!("ContentRectChanged: {:?}", rect);
        let writer = self.writer();
        let mut state = self.lock();
        state.pending_content_rect = rect;
        self.issue(&writer, state, AppCommand::ContentRectChanged);
    }

    pub fn on_input_queue_created(&self, queue: Arc<dyn InputQueue>) {
        debug!("InputQueueCreated: fd {}", queue.fd());
        self.set_input(Some(queue));
    }

    /// Returns once the application thread has detached the queue.
    pub fn on_input_queue_destroyed(&self, queue: &Arc<dyn InputQueue>) {
        debug!("InputQueueDestroyed: fd {}", queue.fd());
        self.set_input(None);
    }

    fn set_input(&self, queue: Option<Arc<dyn InputQueue>>) {
        let writer = self.writer();
        let mut state = self.lock();
        state.pending_input_queue = queue;
        if let Some(seq) = self.issue(&writer, state, AppCommand::InputChanged) {
            drop(self.await_ack(seq));
        }
    }

    /// Issues `Destroy` and waits for the application thread to exit.
    ///
    /// Without a configured destroy timeout the wait is unbounded. With one,
    /// an expired wait returns [`GlueError::DestroyTimeout`] and leaves the
    /// thread detached.
    pub fn on_destroy(mut self) -> Result<()> {
        debug!("Destroy");
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.thread_handle.take() else {
            return Ok(());
        };

        {
            let writer = self.writer();
            self.issue(&writer, self.lock(), AppCommand::Destroy);
        }
        let state = self.lock();
        match self.destroy_timeout {
            None => {
                drop(self.shared.wait_while(state, |s| !s.destroyed));
            }
            Some(timeout) => {
                let (state, result) = self
                    .shared
                    .wait_timeout_while(state, timeout, |s| !s.destroyed);
                drop(state);
                if result.timed_out() {
                    error!(
                        "Application thread still running {} ms after DESTROY; detaching it",
                        timeout.as_millis()
                    );
                    return Err(GlueError::DestroyTimeout { waited: timeout }.into());
                }
            }
        }

        handle
            .join()
            .map_err(|_| anyhow!("Application thread panicked"))?;
        info!("Activity destroyed");
        Ok(())
    }

    /// The window the application thread currently holds.
    pub fn window(&self) -> Option<NativeWindow> {
        self.lock().window.clone()
    }

    pub fn activity_state(&self) -> Option<ActivityState> {
        self.lock().activity_state
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    /// Write/read counters of the command pipe.
    pub fn channel_counters(&self) -> Arc<ChannelCounters> {
        self.counters.clone()
    }
}

impl Drop for ActivityGlue {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!("ActivityGlue dropped without on_destroy");
            if let Err(e) = self.shutdown() {
                error!("Failed to shut down application thread: {:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests;
