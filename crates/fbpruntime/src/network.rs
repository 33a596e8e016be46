use crate::executor::{self, Completion};
use crate::graph::{Graph, StartupOrder};
use fbpcore::{
    CapabilityError, Capacity, Component, ComponentState, Direction, EventBus, ExecutionEvent,
    FlowError, NetworkId, PortRole, Receiver, Sender, WiringError,
};
use std::sync::{Arc, OnceLock};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

static SHARED: OnceLock<Arc<Mutex<Network>>> = OnceLock::new();

/// Façade over a [`Graph`]: registers components, wires them, runs them
/// and reports completion.
pub struct Network {
    id: NetworkId,
    graph: Graph,
    config: NetworkConfig,
    events: Arc<EventBus>,
    cancellation: CancellationToken,
}

impl Network {
    /// Create an independent network with default settings
    pub fn new() -> Self {
        Self::with_config(NetworkConfig::default())
    }

    pub fn with_config(config: NetworkConfig) -> Self {
        let events = Arc::new(EventBus::new(config.event_buffer_size));
        Self {
            id: NetworkId::new_v4(),
            graph: Graph::new(config.default_capacity),
            config,
            events,
            cancellation: CancellationToken::new(),
        }
    }

    /// Process-wide instance, created on first use
    pub fn shared() -> Arc<Mutex<Network>> {
        SHARED
            .get_or_init(|| Arc::new(Mutex::new(Network::new())))
            .clone()
    }

    pub fn id(&self) -> NetworkId {
        self.id
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Register a component under its canonical name.
    ///
    /// Ports marked `exported()` are mapped at the network boundary under
    /// the same name.
    pub fn add<C: Component + 'static>(&mut self, component: C) -> Result<(), FlowError> {
        self.add_boxed(Box::new(component))
    }

    pub fn add_boxed(&mut self, component: Box<dyn Component>) -> Result<(), FlowError> {
        let name = component.name().to_string();
        let ports = component.ports();
        let exported = |direction: Direction| {
            ports
                .iter()
                .find(|spec| spec.exported && spec.direction == direction)
                .map(|spec| spec.name.clone())
        };
        let exported_in = exported(Direction::In);
        let exported_out = exported(Direction::Out);

        if self.graph.contains(&name) {
            return Err(WiringError::DuplicateComponent(name).into());
        }
        if (exported_in.is_some() && self.graph.in_export(&name).is_some())
            || (exported_out.is_some() && self.graph.out_export(&name).is_some())
        {
            return Err(WiringError::DuplicateExport(name).into());
        }

        self.graph.add_component(name.as_str(), component)?;
        if let Some(port) = exported_in {
            self.graph.map_in_port(name.as_str(), &name, &port)?;
        }
        if let Some(port) = exported_out {
            self.graph.map_out_port(name.as_str(), &name, &port)?;
        }

        tracing::info!(network_id = %self.id, component = %name, "component added");
        Ok(())
    }

    /// Register several components, stopping at the first failure
    pub fn add_all<I>(&mut self, components: I) -> Result<(), FlowError>
    where
        I: IntoIterator<Item = Box<dyn Component>>,
    {
        for component in components {
            self.add_boxed(component)?;
        }
        Ok(())
    }

    /// Wire the sender's primary output to the receiver's primary input
    pub fn connect(&mut self, sender: &str, receiver: &str) -> Result<(), FlowError> {
        let sender_port = self.graph.port_with_role(sender, PortRole::Sender)?;
        let receiver_port = self.graph.port_with_role(receiver, PortRole::Receiver)?;
        self.graph.connect(sender, &sender_port, receiver, &receiver_port)
    }

    /// Wire explicitly named ports
    pub fn connect_ports(
        &mut self,
        sender: &str,
        sender_port: &str,
        receiver: &str,
        receiver_port: &str,
    ) -> Result<(), FlowError> {
        self.graph.connect(sender, sender_port, receiver, receiver_port)
    }

    /// Feed a component's exported input from a caller-owned channel
    pub fn set_in_port(&mut self, component: &str, receiver: Receiver) -> Result<(), FlowError> {
        self.ensure_exported(component, Direction::In)?;
        self.graph.set_in_port(component, receiver)?;
        Ok(())
    }

    /// Send a component's exported output to a caller-owned channel
    pub fn set_out_port(&mut self, component: &str, sender: Sender) -> Result<(), FlowError> {
        self.ensure_exported(component, Direction::Out)?;
        self.graph.set_out_port(component, sender)?;
        Ok(())
    }

    fn ensure_exported(&self, component: &str, direction: Direction) -> Result<(), FlowError> {
        if !self.graph.contains(component) {
            return Err(WiringError::UnknownComponent(component.to_string()).into());
        }
        let export = match direction {
            Direction::In => self.graph.in_export(component),
            Direction::Out => self.graph.out_export(component),
        };
        if export.is_none() {
            return Err(CapabilityError::NotExported {
                component: component.to_string(),
                direction,
            }
            .into());
        }
        Ok(())
    }

    /// Start every component in its own task. Does not block.
    ///
    /// Must be called from within a tokio runtime.
    pub fn run(&mut self) -> Result<(), FlowError> {
        if self.graph.is_cyclic() {
            tracing::warn!(network_id = %self.id, "topology contains a cycle; completion depends on components breaking it");
        }
        let (launches, signal) = self.graph.launch(
            self.id,
            &self.events,
            &self.cancellation,
            self.config.startup_order,
        )?;
        executor::start(self.id, launches, self.events.clone(), signal);
        Ok(())
    }

    /// Handle that resolves when every component has terminated
    pub fn wait(&self) -> Completion {
        self.graph.completion()
    }

    /// Ask every component to stop. Inputs read as closed from now on.
    pub fn cancel(&self) {
        tracing::info!(network_id = %self.id, "cancelling network");
        self.cancellation.cancel();
    }

    pub fn state(&self, component: &str) -> Option<ComponentState> {
        self.graph.state(component)
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for a network
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Capacity for connections whose ports do not declare one
    pub default_capacity: Capacity,
    pub event_buffer_size: usize,
    pub startup_order: StartupOrder,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            default_capacity: Capacity::Unbuffered,
            event_buffer_size: 1000,
            startup_order: StartupOrder::Registration,
        }
    }
}
