pub mod load;
pub mod migrate;

pub use load::{load_events, load_snapshot};
pub use migrate::migrate;
