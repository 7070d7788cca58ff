pub mod binance;
pub mod huobi;
