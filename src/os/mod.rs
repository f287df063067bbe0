// src/os/mod.rs

//! Host operating-system primitives backing the looper and the channels.

pub mod epoll;
pub mod pipe;
