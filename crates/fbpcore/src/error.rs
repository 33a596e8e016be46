use crate::port::{Direction, PortRole};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Wiring error: {0}")]
    Wiring(#[from] WiringError),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Component error: {0}")]
    Component(#[from] ComponentError),

    #[error("{} component(s) faulted", .0.len())]
    Faulted(Vec<RuntimeFault>),

    #[error("Network dropped before completion")]
    Abandoned,
}

/// Topology mistakes, reported at the call that made them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WiringError {
    #[error("Component not found: {0}")]
    UnknownComponent(String),

    #[error("Component already added: {0}")]
    DuplicateComponent(String),

    #[error("Malformed component '{component}': {reason}")]
    MalformedComponent { component: String, reason: String },

    #[error("Receiver port {component}.{port} is already bound")]
    ReceiverAlreadyBound { component: String, port: String },

    #[error("Export not found: {0}")]
    UnknownExport(String),

    #[error("Export already mapped: {0}")]
    DuplicateExport(String),

    #[error("Network already started")]
    AlreadyStarted,
}

/// A port was requested that the component never advertised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Component '{component}' does not declare port '{port}'")]
    UndeclaredPort { component: String, port: String },

    #[error("Port {component}.{port} is not an {expected} port")]
    WrongDirection {
        component: String,
        port: String,
        expected: Direction,
    },

    #[error("Component '{component}' does not advertise a {role} port")]
    MissingRole { component: String, role: PortRole },

    #[error("Component '{component}' does not export an {direction} port")]
    NotExported {
        component: String,
        direction: Direction,
    },
}

/// Errors raised by component logic while the network runs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComponentError {
    #[error("Undeclared port: {0}")]
    MissingPort(String),

    #[error("Port already taken: {0}")]
    PortTaken(String),

    /// Every receiver of this output is gone. Not a fault.
    #[error("Port closed: {0}")]
    PortClosed(String),

    #[error("Invalid message on '{port}': expected {expected}, got {actual}")]
    InvalidMessage {
        port: String,
        expected: String,
        actual: String,
    },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Network cancelled while the component was blocked. Not a fault.
    #[error("Cancelled")]
    Cancelled,
}

/// A component that stopped abnormally. Siblings keep running.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("component '{component}' {kind}")]
pub struct RuntimeFault {
    pub component: String,
    pub kind: FaultKind,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FaultKind {
    #[error("failed: {0}")]
    Failed(ComponentError),

    #[error("panicked: {0}")]
    Panicked(String),
}
