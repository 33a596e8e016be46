// crates/fbpcore/src/events/mod.rs

mod base;

pub use base::{ComponentEvent, EventBus, EventEmitter, ExecutionEvent, NetworkId};
