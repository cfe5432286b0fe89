pub mod store;
pub mod store_event;

pub use store::{Store, StoreEngine, StoreStatus};
pub use store_event::StoreEvent;
