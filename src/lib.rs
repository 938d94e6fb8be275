#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod caption;
pub mod config;
pub mod controller;
pub mod data;
pub mod history;
pub mod media;
pub mod ui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
