// src/state.rs

//! State shared between the platform callback thread and the application
//! thread, guarded by one mutex and one condition variable.
//!
//! "Pending" fields are written by the callback thread before it issues the
//! matching command; the application thread adopts them while
//! pre-processing that command.

use crate::command::ActivityState;
use crate::device::DeviceConfiguration;
use crate::input::InputQueue;
use crate::window::{NativeWindow, Rect};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, WaitTimeoutResult};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct SharedState {
    pub pending_input_queue: Option<Arc<dyn InputQueue>>,
    pub pending_window: Option<NativeWindow>,
    /// The window the application thread currently holds.
    pub window: Option<NativeWindow>,
    pub pending_content_rect: Rect,
    pub pending_configuration: DeviceConfiguration,
    /// At most one blob at a time; see `App::set_saved_state`.
    pub saved_state: Option<Vec<u8>>,
    pub activity_state: Option<ActivityState>,
    pub running: bool,
    pub destroyed: bool,
    pub state_saved: bool,
    pub redraw_needed: bool,
    /// Sequence number of the last command written to the pipe.
    pub issued: u64,
    /// Sequence number of the last command post-processed.
    pub acknowledged: u64,
}

#[derive(Debug, Default)]
pub struct Shared {
    state: Mutex<SharedState>,
    cond: Condvar,
}

impl Shared {
    pub fn new(saved_state: Option<Vec<u8>>) -> Self {
        Self {
            state: Mutex::new(SharedState {
                saved_state,
                ..SharedState::default()
            }),
            cond: Condvar::new(),
        }
    }

    /// A panic while holding the lock leaves the fields consistent enough
    /// for shutdown, so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn broadcast(&self) {
        self.cond.notify_all();
    }

    pub fn wait_while<'a, F>(
        &self,
        guard: MutexGuard<'a, SharedState>,
        condition: F,
    ) -> MutexGuard<'a, SharedState>
    where
        F: FnMut(&mut SharedState) -> bool,
    {
        self.cond
            .wait_while(guard, condition)
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn wait_timeout_while<'a, F>(
        &self,
        guard: MutexGuard<'a, SharedState>,
        timeout: Duration,
        condition: F,
    ) -> (MutexGuard<'a, SharedState>, WaitTimeoutResult)
    where
        F: FnMut(&mut SharedState) -> bool,
    {
        self.cond
            .wait_timeout_while(guard, timeout, condition)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn initial_blob_is_held_until_taken() {
        let shared = Shared::new(Some(vec![1, 2, 3]));
        let mut state = shared.lock();
        assert_eq!(state.saved_state.take(), Some(vec![1, 2, 3]));
        assert!(state.saved_state.is_none());
        assert!(!state.running);
    }

    #[test]
    fn waiter_wakes_on_broadcast_after_condition_changes() {
        let shared = Arc::new(Shared::new(None));
        let other = shared.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            other.lock().acknowledged = 1;
            other.broadcast();
        });
        let state = shared.wait_while(shared.lock(), |s| s.acknowledged < 1);
        assert_eq!(state.acknowledged, 1);
        drop(state);
        handle.join().unwrap();
    }

    #[test]
    fn timed_wait_reports_timeout() {
        let shared = Shared::new(None);
        let (state, result) =
            shared.wait_timeout_while(shared.lock(), Duration::from_millis(5), |s| !s.destroyed);
        assert!(result.timed_out());
        assert!(!state.destroyed);
    }
}
