pub mod common;
pub mod stock;

pub use stock::{stock_routes, StockHandlerState};
