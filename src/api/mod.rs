// Raw exchange clients
// Binance USD-M futures over REST, plus a paper account for dry runs
pub mod binance;
pub mod paper;

pub use binance::BinanceFuturesClient;
pub use paper::PaperExchange;
