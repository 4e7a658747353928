#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod config;
pub mod extract;
pub mod feed;
pub mod logging;
pub mod pager;
pub mod player;
pub mod playlist;
pub mod reddit;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
