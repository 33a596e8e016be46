use crate::events::EventEmitter;
use crate::port::{InPort, OutPort, PortSpec};
use crate::ComponentError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Core trait that every network component implements.
///
/// The runtime only ever looks at the port listing and calls `execute`
/// once. Ports are handed over through the [`ComponentContext`].
#[async_trait]
pub trait Component: Send {
    /// Type identifier (e.g., "core.source", "transform.map")
    fn component_type(&self) -> &str;

    /// Canonical name, unique within a graph
    fn name(&self) -> &str {
        self.component_type()
    }

    /// Capability listing: every port this component owns
    fn ports(&self) -> Vec<PortSpec>;

    /// Processing loop. Runs in its own task until inputs are exhausted.
    async fn execute(&mut self, ctx: ComponentContext) -> Result<(), ComponentError>;
}

/// Ports and services handed to a component when the network starts
pub struct ComponentContext {
    pub name: String,
    inputs: HashMap<String, InPort>,
    outputs: HashMap<String, OutPort>,
    declared: Vec<String>,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Tripped by `Network::cancel`
    pub cancellation: CancellationToken,
}

impl ComponentContext {
    pub fn new(
        name: impl Into<String>,
        events: EventEmitter,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            name: name.into(),
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            declared: Vec::new(),
            events,
            cancellation,
        }
    }

    pub fn insert_input(&mut self, port: InPort) {
        self.declared.push(port.name().to_string());
        self.inputs.insert(port.name().to_string(), port);
    }

    pub fn insert_output(&mut self, port: OutPort) {
        self.declared.push(port.name().to_string());
        self.outputs.insert(port.name().to_string(), port);
    }

    /// Take ownership of a declared input port
    pub fn take_input(&mut self, name: &str) -> Result<InPort, ComponentError> {
        self.inputs.remove(name).ok_or_else(|| self.missing(name))
    }

    /// Take ownership of a declared output port
    pub fn take_output(&mut self, name: &str) -> Result<OutPort, ComponentError> {
        self.outputs.remove(name).ok_or_else(|| self.missing(name))
    }

    /// Take every remaining input port, ordered by name
    pub fn take_inputs(&mut self) -> Vec<InPort> {
        let mut ports: Vec<InPort> = self.inputs.drain().map(|(_, port)| port).collect();
        ports.sort_by(|a, b| a.name().cmp(b.name()));
        ports
    }

    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.keys().map(String::as_str).collect()
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.keys().map(String::as_str).collect()
    }

    fn missing(&self, name: &str) -> ComponentError {
        if self.declared.iter().any(|declared| declared == name) {
            ComponentError::PortTaken(name.to_string())
        } else {
            ComponentError::MissingPort(name.to_string())
        }
    }
}

/// Lifecycle of a component inside a running network
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComponentState {
    NotStarted,
    Running,
    Draining,
    Terminated,
}

impl ComponentState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ComponentState::NotStarted,
            1 => ComponentState::Running,
            2 => ComponentState::Draining,
            _ => ComponentState::Terminated,
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ComponentState::NotStarted => "not-started",
            ComponentState::Running => "running",
            ComponentState::Draining => "draining",
            ComponentState::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// Shared, lock-free view of a component's lifecycle.
///
/// States only move forward. Input ports report their closure here; the
/// last one moves a running component to `Draining`.
#[derive(Debug)]
pub struct ComponentStatus {
    name: String,
    state: AtomicU8,
    open_inputs: AtomicUsize,
    events: EventEmitter,
}

impl ComponentStatus {
    pub fn new(name: impl Into<String>, events: EventEmitter) -> Self {
        Self {
            name: name.into(),
            state: AtomicU8::new(ComponentState::NotStarted as u8),
            open_inputs: AtomicUsize::new(0),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ComponentState {
        ComponentState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of bound inputs that must close before the component drains
    pub fn track_inputs(&self, open: usize) {
        self.open_inputs.store(open, Ordering::Release);
    }

    /// Move forward to `next`. Returns false if already there or beyond.
    pub fn advance(&self, next: ComponentState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= next as u8 {
                return false;
            }
            match self.state.compare_exchange(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        tracing::debug!(
            component = %self.name,
            from = %ComponentState::from_u8(current),
            to = %next,
            "component state changed"
        );
        self.events.state_changed(next);
        true
    }

    pub(crate) fn input_closed(&self) {
        let previous = self
            .open_inputs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| open.checked_sub(1));
        if previous == Ok(1) {
            self.advance(ComponentState::Draining);
        }
    }
}
