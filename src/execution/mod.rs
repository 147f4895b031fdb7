// Trading loop module
// Validated bot parameters and the per-bot tick loop
pub mod bot;
pub mod params;

pub use bot::{BotHandle, BotState, TradeOutcome, TradingBot};
pub use params::{BotParams, BotParamsBuilder, TradingConfig};
