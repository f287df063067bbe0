// src/lib.rs

//! Native activity glue: runs an application on its own thread, delivers
//! lifecycle commands to it over a pipe, and multiplexes commands, input
//! and application sources through a looper.

pub mod activity;
pub mod app;
pub mod channel;
pub mod command;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod handler;
pub mod input;
pub mod looper;
pub mod os;
pub mod poll_source;
pub mod state;
pub mod window;

pub use activity::ActivityGlue;
pub use app::App;
pub use command::{ActivityState, AppCommand};
pub use error::GlueError;
pub use handler::AppHandler;
pub use looper::{Looper, LooperEvents, PollEvent};
pub use poll_source::{PollSource, LOOPER_ID_INPUT, LOOPER_ID_MAIN, LOOPER_ID_USER};
