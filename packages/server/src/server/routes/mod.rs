// HTTP routes
pub mod health;
pub mod stores;

pub use health::*;
pub use stores::*;
