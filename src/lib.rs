pub mod commands;
pub mod config;
pub mod connectors;
pub mod console;
pub mod core;
pub mod storage;
pub mod types;
pub mod utils;
