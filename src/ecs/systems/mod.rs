pub mod trade;

pub use trade::add_trade_systems;
