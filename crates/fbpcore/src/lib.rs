//! Core abstractions for the flow-based network runtime
//!
//! This crate provides the message value, the port and channel types, the
//! component trait and the error kinds that every other crate depends on.
//! It does not spawn anything itself.

mod component;
mod error;
pub mod events;
pub mod port;
mod value;

pub use component::{Component, ComponentContext, ComponentState, ComponentStatus};
pub use error::{
    CapabilityError, ComponentError, FaultKind, FlowError, RuntimeFault, WiringError,
};
pub use events::*;
pub use port::{
    channel, Capacity, ChannelClosed, Direction, InPort, OutPort, PortRole, PortSpec, Receiver,
    Sender,
};
pub use value::Value;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
