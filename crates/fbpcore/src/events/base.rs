use crate::ComponentState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type NetworkId = Uuid;

/// Events emitted while a network runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    NetworkStarted {
        network_id: NetworkId,
        components: usize,
        timestamp: DateTime<Utc>,
    },
    NetworkCompleted {
        network_id: NetworkId,
        success: bool,
        faults: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    ComponentStateChanged {
        network_id: NetworkId,
        component: String,
        state: ComponentState,
        timestamp: DateTime<Utc>,
    },
    ComponentFailed {
        network_id: NetworkId,
        component: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    ComponentEvent {
        network_id: NetworkId,
        component: String,
        event: ComponentEvent,
        timestamp: DateTime<Utc>,
    },
}

/// Events raised by component logic
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum ComponentEvent {
    Info { message: String },
    Warning { message: String },
}

/// Event emitter bound to one component of one network
#[derive(Debug, Clone)]
pub struct EventEmitter {
    network_id: NetworkId,
    component: String,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(
        network_id: NetworkId,
        component: impl Into<String>,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            network_id,
            component: component.into(),
            sender,
        }
    }

    /// Emit a component-specific event
    pub fn emit(&self, event: ComponentEvent) {
        let _ = self.sender.send(ExecutionEvent::ComponentEvent {
            network_id: self.network_id,
            component: self.component.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    /// Emit info message
    pub fn info(&self, message: impl Into<String>) {
        self.emit(ComponentEvent::Info {
            message: message.into(),
        });
    }

    /// Emit warning message
    pub fn warn(&self, message: impl Into<String>) {
        self.emit(ComponentEvent::Warning {
            message: message.into(),
        });
    }

    pub(crate) fn state_changed(&self, state: ComponentState) {
        let _ = self.sender.send(ExecutionEvent::ComponentStateChanged {
            network_id: self.network_id,
            component: self.component.clone(),
            state,
            timestamp: Utc::now(),
        });
    }
}

/// Per-network event bus. Events without subscribers are dropped.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, network_id: NetworkId, component: impl Into<String>) -> EventEmitter {
        EventEmitter::new(network_id, component, self.sender.clone())
    }
}
