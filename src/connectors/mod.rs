pub mod binance;
pub mod paper;
pub mod traits;
