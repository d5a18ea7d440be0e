pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod exit;
pub mod session;
pub mod stream;
pub mod tracker;
pub mod tui;
pub mod ui;
