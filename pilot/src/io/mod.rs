//! I/O adapters for the controller.

pub mod backend;
pub mod config;
pub mod local;
pub mod policy;
pub mod process;
pub mod remote;
pub mod screen;
pub mod step_log;
pub mod template;
