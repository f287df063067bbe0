// src/os/epoll.rs

//! Thin wrapper over `epoll` using raw `libc` calls.
//!
//! The looper multiplexes every pollable source through one `Epoll` instance.
//! Registrations are level-triggered: a source that still has data keeps
//! reporting readiness on every wait.

use anyhow::{Context, Result};
use bitflags::bitflags;
use log::{debug, trace};
use std::fmt;
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
enum EpollCtlOp {
    Add = libc::EPOLL_CTL_ADD,
    Mod = libc::EPOLL_CTL_MOD,
    Del = libc::EPOLL_CTL_DEL,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EpollFlags: u32 {
        const EPOLLIN = libc::EPOLLIN as u32;
        const EPOLLOUT = libc::EPOLLOUT as u32;
        const EPOLLERR = libc::EPOLLERR as u32;
        const EPOLLHUP = libc::EPOLLHUP as u32;
    }
}

/// One readiness report: the token given at registration plus the flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub token: u64,
    pub flags: EpollFlags,
}

const MAX_EVENTS_BUFFER_SIZE: usize = 16;

/// Converts a looper timeout to the millisecond argument of `epoll_wait`.
/// `None` blocks forever. Sub-millisecond remainders round up so a short
/// timeout never degrades into a busy poll.
pub fn timeout_to_millis(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(d) => {
            let mut ms = d.as_millis();
            if d.subsec_nanos() % 1_000_000 != 0 {
                ms += 1;
            }
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

pub struct Epoll {
    fd: OwnedFd,
    event_buffer: [libc::epoll_event; MAX_EVENTS_BUFFER_SIZE],
}

impl fmt::Debug for Epoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Epoll").field("fd", &self.fd).finish()
    }
}

impl Epoll {
    pub fn new() -> Result<Self> {
        let raw = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if raw == -1 {
            return Err(io::Error::last_os_error())
                .context("Failed to create epoll instance (epoll_create1)");
        }
        debug!("Epoll created with fd {}", raw);
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(raw) },
            event_buffer: [libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS_BUFFER_SIZE],
        })
    }

    fn ctl(&self, op: EpollCtlOp, fd: RawFd, token: u64, flags: EpollFlags) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: flags.bits(),
            u64: token,
        };
        if unsafe { libc::epoll_ctl(self.fd.as_raw_fd(), op as libc::c_int, fd, &mut event) } == -1
        {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn add(&self, fd: RawFd, token: u64, flags: EpollFlags) -> Result<()> {
        self.ctl(EpollCtlOp::Add, fd, token, flags)
            .with_context(|| format!("Failed to add fd {} to epoll (token: {})", fd, token))?;
        trace!("Added fd {} with token {} and flags {:?}", fd, token, flags);
        Ok(())
    }

    pub fn modify(&self, fd: RawFd, token: u64, flags: EpollFlags) -> Result<()> {
        self.ctl(EpollCtlOp::Mod, fd, token, flags)
            .with_context(|| format!("Failed to modify fd {} in epoll (token: {})", fd, token))?;
        trace!("Modified fd {} to token {} and flags {:?}", fd, token, flags);
        Ok(())
    }

    pub fn delete(&self, fd: RawFd) -> Result<()> {
        self.ctl(EpollCtlOp::Del, fd, 0, EpollFlags::empty())
            .with_context(|| format!("Failed to delete fd {} from epoll", fd))?;
        trace!("Deleted fd {} from epoll", fd);
        Ok(())
    }

    /// Waits for readiness. An interrupted wait returns an empty list.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<Vec<Readiness>> {
        let timeout_ms = timeout_to_millis(timeout);
        let num_events = unsafe {
            libc::epoll_wait(
                self.fd.as_raw_fd(),
                self.event_buffer.as_mut_ptr(),
                MAX_EVENTS_BUFFER_SIZE as libc::c_int,
                timeout_ms,
            )
        };

        if num_events == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                trace!("epoll_wait interrupted (EINTR)");
                return Ok(Vec::new());
            }
            return Err(err).context("epoll_wait failed");
        }

        trace!("epoll_wait({} ms) returned {} events", timeout_ms, num_events);
        Ok(self.event_buffer[..num_events as usize]
            .iter()
            .map(|event| Readiness {
                token: event.u64,
                flags: EpollFlags::from_bits_truncate(event.events),
            })
            .collect())
    }
}
