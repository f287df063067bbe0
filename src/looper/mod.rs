// src/looper/mod.rs

//! The looper: the application thread's event multiplexer.
//!
//! File descriptors are registered with a non-negative identifier and an
//! optional [`PollSource`]. [`Looper::poll_once`] blocks until one registered
//! descriptor is ready, the looper is woken, or the timeout expires, and
//! reports exactly one of those per call. Several ready descriptors from one
//! wait are queued and handed out on subsequent calls.

pub mod waker;

use crate::os::epoll::{Epoll, EpollFlags};
use crate::os::pipe::{set_nonblocking, Pipe};
use crate::poll_source::PollSource;
use anyhow::{ensure, Context, Result};
use bitflags::bitflags;
use log::{debug, trace};
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

pub use waker::{EventLoopWaker, LooperWaker};

/// Epoll token reserved for the wake pipe. Registered fds use their own
/// value as token, which is never negative.
const WAKE_TOKEN: u64 = u64::MAX;

bitflags! {
    /// Readiness conditions a registration asks for and a poll reports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LooperEvents: u32 {
        const INPUT = 1 << 0;
        const OUTPUT = 1 << 1;
        const ERROR = 1 << 2;
        const HANGUP = 1 << 3;
    }
}

impl From<LooperEvents> for EpollFlags {
    fn from(events: LooperEvents) -> Self {
        let mut flags = EpollFlags::empty();
        if events.contains(LooperEvents::INPUT) {
            flags |= EpollFlags::EPOLLIN;
        }
        if events.contains(LooperEvents::OUTPUT) {
            flags |= EpollFlags::EPOLLOUT;
        }
        flags
    }
}

impl From<EpollFlags> for LooperEvents {
    fn from(flags: EpollFlags) -> Self {
        let mut events = LooperEvents::empty();
        if flags.contains(EpollFlags::EPOLLIN) {
            events |= LooperEvents::INPUT;
        }
        if flags.contains(EpollFlags::EPOLLOUT) {
            events |= LooperEvents::OUTPUT;
        }
        if flags.contains(EpollFlags::EPOLLERR) {
            events |= LooperEvents::ERROR;
        }
        if flags.contains(EpollFlags::EPOLLHUP) {
            events |= LooperEvents::HANGUP;
        }
        events
    }
}

/// Result of one [`Looper::poll_once`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    /// A registered descriptor is ready.
    Ready {
        ident: i32,
        events: LooperEvents,
        source: Option<PollSource>,
    },
    /// [`LooperWaker::wake`] was called.
    Wake,
    /// The timeout elapsed with nothing ready.
    Timeout,
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    ident: i32,
    source: Option<PollSource>,
}

#[derive(Debug)]
pub struct Looper {
    epoll: Epoll,
    registrations: HashMap<RawFd, Registration>,
    ready: VecDeque<(RawFd, LooperEvents)>,
    pending_wake: bool,
    wake_reader: File,
    waker: LooperWaker,
}

impl Looper {
    /// Prepares a looper for the calling thread.
    pub fn prepare() -> Result<Self> {
        let epoll = Epoll::new().context("Failed to create looper epoll")?;
        let Pipe { reader, writer } = Pipe::new().context("Failed to create looper wake pipe")?;
        set_nonblocking(reader.as_raw_fd())?;
        set_nonblocking(writer.as_raw_fd())?;
        epoll.add(reader.as_raw_fd(), WAKE_TOKEN, EpollFlags::EPOLLIN)?;
        debug!("Looper prepared (wake fd {})", reader.as_raw_fd());
        Ok(Self {
            epoll,
            registrations: HashMap::new(),
            ready: VecDeque::new(),
            pending_wake: false,
            wake_reader: reader,
            waker: LooperWaker::new(writer),
        })
    }

    /// Handle other threads use to interrupt a blocking poll.
    pub fn waker(&self) -> LooperWaker {
        self.waker.clone()
    }

    /// Registers `fd`, or replaces the existing registration of `fd`.
    pub fn add_fd(
        &mut self,
        fd: RawFd,
        ident: i32,
        events: LooperEvents,
        source: Option<PollSource>,
    ) -> Result<()> {
        ensure!(ident >= 0, "Looper identifiers must be non-negative (got {})", ident);
        ensure!(fd >= 0, "Invalid fd {}", fd);
        let flags = EpollFlags::from(events);
        if self.registrations.contains_key(&fd) {
            self.epoll.modify(fd, fd as u64, flags)?;
        } else {
            self.epoll.add(fd, fd as u64, flags)?;
        }
        self.registrations.insert(fd, Registration { ident, source });
        debug!("Looper: fd {} registered with ident {}", fd, ident);
        Ok(())
    }

    /// Removes `fd`. Returns `false` if it was not registered.
    pub fn remove_fd(&mut self, fd: RawFd) -> Result<bool> {
        if self.registrations.remove(&fd).is_none() {
            return Ok(false);
        }
        self.ready.retain(|(ready_fd, _)| *ready_fd != fd);
        self.epoll.delete(fd)?;
        debug!("Looper: fd {} removed", fd);
        Ok(true)
    }

    pub fn is_registered(&self, fd: RawFd) -> bool {
        self.registrations.contains_key(&fd)
    }

    /// Waits for one event. `None` blocks until something happens;
    /// `Some(Duration::ZERO)` only checks.
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> Result<PollEvent> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            while let Some((fd, events)) = self.ready.pop_front() {
                if let Some(reg) = self.registrations.get(&fd) {
                    trace!("Looper: fd {} ready (ident {})", fd, reg.ident);
                    return Ok(PollEvent::Ready {
                        ident: reg.ident,
                        events,
                        source: reg.source,
                    });
                }
            }
            if self.pending_wake {
                self.pending_wake = false;
                return Ok(PollEvent::Wake);
            }

            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            for readiness in self.epoll.wait(remaining)? {
                if readiness.token == WAKE_TOKEN {
                    self.drain_wake_pipe()?;
                    self.pending_wake = true;
                } else {
                    self.ready
                        .push_back((readiness.token as RawFd, readiness.flags.into()));
                }
            }

            if self.ready.is_empty() && !self.pending_wake {
                if let Some(d) = deadline {
                    if Instant::now() >= d {
                        return Ok(PollEvent::Timeout);
                    }
                }
            }
        }
    }

    fn drain_wake_pipe(&mut self) -> Result<()> {
        let mut buf = [0u8; 64];
        loop {
            match self.wake_reader.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("Failed to drain looper wake pipe"),
            }
        }
    }
}
