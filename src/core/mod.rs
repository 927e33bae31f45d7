pub mod engine;
pub mod state;
pub mod strategy;
