use crate::executor::{completion, Completion, CompletionSignal, Launch};
use fbpcore::{
    channel, CapabilityError, Capacity, Component, ComponentContext, ComponentState,
    ComponentStatus, Direction, EventBus, FlowError, InPort, NetworkId, OutPort, PortRole,
    PortSpec, Receiver, Sender, WiringError,
};
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Wiring between one sender port and one receiver port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub sender: String,
    pub sender_port: String,
    pub receiver: String,
    pub receiver_port: String,
}

/// A port of a registered component
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub component: String,
    pub port: String,
}

/// Order in which component tasks are spawned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartupOrder {
    #[default]
    Registration,
    /// Receivers before their senders, when the topology is acyclic
    DownstreamFirst,
}

enum InBinding {
    Connected(Receiver),
    External(Receiver),
}

impl InBinding {
    fn into_receiver(self) -> (Receiver, bool) {
        match self {
            InBinding::Connected(receiver) => (receiver, false),
            InBinding::External(receiver) => (receiver, true),
        }
    }
}

struct ComponentEntry {
    name: String,
    instance: Option<Box<dyn Component>>,
    ports: Vec<PortSpec>,
    inputs: HashMap<String, InBinding>,
    outputs: HashMap<String, Vec<Sender>>,
}

impl ComponentEntry {
    fn declared(&self, port: &str, direction: Direction) -> Result<&PortSpec, CapabilityError> {
        let spec = self
            .ports
            .iter()
            .find(|spec| spec.name == port)
            .ok_or_else(|| CapabilityError::UndeclaredPort {
                component: self.name.clone(),
                port: port.to_string(),
            })?;
        if spec.direction != direction {
            return Err(CapabilityError::WrongDirection {
                component: self.name.clone(),
                port: port.to_string(),
                expected: direction,
            });
        }
        Ok(spec)
    }

    fn bind_input(&mut self, port: &str, binding: InBinding) -> Result<(), WiringError> {
        if self.inputs.contains_key(port) {
            return Err(WiringError::ReceiverAlreadyBound {
                component: self.name.clone(),
                port: port.to_string(),
            });
        }
        self.inputs.insert(port.to_string(), binding);
        Ok(())
    }
}

/// Topology container: components, connections, exported ports and the
/// network completion signal.
///
/// All mutation happens before [`Graph::launch`]; afterwards every wiring
/// call fails with [`WiringError::AlreadyStarted`].
pub struct Graph {
    components: Vec<ComponentEntry>,
    index: HashMap<String, usize>,
    connections: Vec<Connection>,
    in_exports: HashMap<String, PortRef>,
    out_exports: HashMap<String, PortRef>,
    statuses: HashMap<String, Arc<ComponentStatus>>,
    default_capacity: Capacity,
    completion: Completion,
    signal: Option<CompletionSignal>,
}

impl Graph {
    pub fn new(default_capacity: Capacity) -> Self {
        let (signal, completion) = completion();
        Self {
            components: Vec::new(),
            index: HashMap::new(),
            connections: Vec::new(),
            in_exports: HashMap::new(),
            out_exports: HashMap::new(),
            statuses: HashMap::new(),
            default_capacity,
            completion,
            signal: Some(signal),
        }
    }

    /// Register a component under `name`
    pub fn add_component(
        &mut self,
        name: impl Into<String>,
        instance: Box<dyn Component>,
    ) -> Result<(), WiringError> {
        self.ensure_wiring()?;
        let name = name.into();
        let ports = instance.ports();
        validate_listing(&name, &ports)?;
        if self.index.contains_key(&name) {
            return Err(WiringError::DuplicateComponent(name));
        }

        tracing::debug!(component = %name, ports = ports.len(), "registering component");
        self.index.insert(name.clone(), self.components.len());
        self.components.push(ComponentEntry {
            name,
            instance: Some(instance),
            ports,
            inputs: HashMap::new(),
            outputs: HashMap::new(),
        });
        Ok(())
    }

    /// Wire `sender.sender_port` to `receiver.receiver_port`.
    ///
    /// A sender port may feed several receivers (broadcast). A receiver port
    /// accepts exactly one binding.
    pub fn connect(
        &mut self,
        sender: &str,
        sender_port: &str,
        receiver: &str,
        receiver_port: &str,
    ) -> Result<(), FlowError> {
        self.ensure_wiring()?;
        let sender_idx = self.entry_index(sender)?;
        let receiver_idx = self.entry_index(receiver)?;

        let out_capacity = self.components[sender_idx]
            .declared(sender_port, Direction::Out)?
            .capacity;
        let in_capacity = self.components[receiver_idx]
            .declared(receiver_port, Direction::In)?
            .capacity;
        if self.components[receiver_idx].inputs.contains_key(receiver_port) {
            return Err(WiringError::ReceiverAlreadyBound {
                component: receiver.to_string(),
                port: receiver_port.to_string(),
            }
            .into());
        }

        let capacity = in_capacity.or(out_capacity).unwrap_or(self.default_capacity);
        let (tx, rx) = channel(capacity);
        self.components[receiver_idx].bind_input(receiver_port, InBinding::Connected(rx))?;
        self.components[sender_idx]
            .outputs
            .entry(sender_port.to_string())
            .or_default()
            .push(tx);

        tracing::debug!(
            sender = %sender,
            sender_port = %sender_port,
            receiver = %receiver,
            receiver_port = %receiver_port,
            ?capacity,
            "connected"
        );
        self.connections.push(Connection {
            sender: sender.to_string(),
            sender_port: sender_port.to_string(),
            receiver: receiver.to_string(),
            receiver_port: receiver_port.to_string(),
        });
        Ok(())
    }

    /// Export `component.port` as a network input named `export`
    pub fn map_in_port(
        &mut self,
        export: impl Into<String>,
        component: &str,
        port: &str,
    ) -> Result<(), FlowError> {
        self.ensure_wiring()?;
        let export = export.into();
        if self.in_exports.contains_key(&export) {
            return Err(WiringError::DuplicateExport(export).into());
        }
        let idx = self.entry_index(component)?;
        self.components[idx].declared(port, Direction::In)?;

        tracing::debug!(export = %export, component = %component, port = %port, "mapped in-port");
        self.in_exports.insert(
            export,
            PortRef {
                component: component.to_string(),
                port: port.to_string(),
            },
        );
        Ok(())
    }

    /// Export `component.port` as a network output named `export`
    pub fn map_out_port(
        &mut self,
        export: impl Into<String>,
        component: &str,
        port: &str,
    ) -> Result<(), FlowError> {
        self.ensure_wiring()?;
        let export = export.into();
        if self.out_exports.contains_key(&export) {
            return Err(WiringError::DuplicateExport(export).into());
        }
        let idx = self.entry_index(component)?;
        self.components[idx].declared(port, Direction::Out)?;

        tracing::debug!(export = %export, component = %component, port = %port, "mapped out-port");
        self.out_exports.insert(
            export,
            PortRef {
                component: component.to_string(),
                port: port.to_string(),
            },
        );
        Ok(())
    }

    /// Bind a caller-owned channel to an exported input.
    ///
    /// The caller closes it by dropping every `Sender` it holds.
    pub fn set_in_port(&mut self, export: &str, receiver: Receiver) -> Result<(), WiringError> {
        self.ensure_wiring()?;
        let target = self
            .in_exports
            .get(export)
            .cloned()
            .ok_or_else(|| WiringError::UnknownExport(export.to_string()))?;
        let idx = self.entry_index(&target.component)?;
        self.components[idx].bind_input(&target.port, InBinding::External(receiver))?;
        tracing::debug!(export = %export, component = %target.component, port = %target.port, "bound external input");
        Ok(())
    }

    /// Bind a caller-supplied sender to an exported output
    pub fn set_out_port(&mut self, export: &str, sender: Sender) -> Result<(), WiringError> {
        self.ensure_wiring()?;
        let target = self
            .out_exports
            .get(export)
            .cloned()
            .ok_or_else(|| WiringError::UnknownExport(export.to_string()))?;
        let idx = self.entry_index(&target.component)?;
        self.components[idx]
            .outputs
            .entry(target.port.clone())
            .or_default()
            .push(sender);
        tracing::debug!(export = %export, component = %target.component, port = %target.port, "bound external output");
        Ok(())
    }

    /// Name of the port a component advertises for `role`
    pub fn port_with_role(&self, component: &str, role: PortRole) -> Result<String, FlowError> {
        let idx = self.entry_index(component)?;
        let entry = &self.components[idx];
        entry
            .ports
            .iter()
            .find(|spec| spec.role() == Some(role))
            .map(|spec| spec.name.clone())
            .ok_or_else(|| {
                CapabilityError::MissingRole {
                    component: component.to_string(),
                    role,
                }
                .into()
            })
    }

    pub fn contains(&self, component: &str) -> bool {
        self.index.contains_key(component)
    }

    pub fn ports(&self, component: &str) -> Option<&[PortSpec]> {
        self.index
            .get(component)
            .map(|idx| self.components[*idx].ports.as_slice())
    }

    /// Component names in registration order
    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|entry| entry.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn in_export(&self, export: &str) -> Option<&PortRef> {
        self.in_exports.get(export)
    }

    pub fn out_export(&self, export: &str) -> Option<&PortRef> {
        self.out_exports.get(export)
    }

    pub fn is_started(&self) -> bool {
        self.signal.is_none()
    }

    /// Lifecycle state of a registered component
    pub fn state(&self, component: &str) -> Option<ComponentState> {
        match self.statuses.get(component) {
            Some(status) => Some(status.state()),
            None if self.contains(component) => Some(ComponentState::NotStarted),
            None => None,
        }
    }

    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    /// True if connections form a cycle, which may keep the network from terminating
    pub fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.dependency_graph())
    }

    fn dependency_graph(&self) -> DiGraph<usize, ()> {
        let mut graph = DiGraph::new();
        let nodes: Vec<_> = (0..self.components.len())
            .map(|idx| graph.add_node(idx))
            .collect();
        for conn in &self.connections {
            if let (Some(from), Some(to)) =
                (self.index.get(&conn.sender), self.index.get(&conn.receiver))
            {
                graph.add_edge(nodes[*from], nodes[*to], ());
            }
        }
        graph
    }

    /// Component indices in the order their tasks should be spawned
    pub fn startup_order(&self, order: StartupOrder) -> Vec<&str> {
        self.startup_indices(order)
            .into_iter()
            .map(|idx| self.components[idx].name.as_str())
            .collect()
    }

    fn startup_indices(&self, order: StartupOrder) -> Vec<usize> {
        let registration: Vec<usize> = (0..self.components.len()).collect();
        match order {
            StartupOrder::Registration => registration,
            StartupOrder::DownstreamFirst => {
                let graph = self.dependency_graph();
                match toposort(&graph, None) {
                    Ok(sorted) => sorted.into_iter().rev().map(|node| graph[node]).collect(),
                    Err(_) => {
                        tracing::warn!("topology has a cycle; starting in registration order");
                        registration
                    }
                }
            }
        }
    }

    /// Freeze the topology and hand every component its ports.
    ///
    /// Every channel already exists at this point, so each returned launch is
    /// fully wired before any of them is spawned.
    pub(crate) fn launch(
        &mut self,
        network_id: NetworkId,
        events: &EventBus,
        cancellation: &CancellationToken,
        order: StartupOrder,
    ) -> Result<(Vec<Launch>, CompletionSignal), WiringError> {
        let signal = self.signal.take().ok_or(WiringError::AlreadyStarted)?;
        let order = self.startup_indices(order);

        let mut launches = Vec::with_capacity(order.len());
        for idx in order {
            let entry = &mut self.components[idx];
            let Some(component) = entry.instance.take() else {
                continue;
            };

            let emitter = events.create_emitter(network_id, entry.name.as_str());
            let status = Arc::new(ComponentStatus::new(entry.name.as_str(), emitter.clone()));
            let token = cancellation.child_token();
            let mut ctx = ComponentContext::new(entry.name.as_str(), emitter, token.clone());

            let mut bound_inputs = 0;
            for spec in &entry.ports {
                match spec.direction {
                    Direction::In => {
                        let receiver = match entry.inputs.remove(&spec.name) {
                            Some(binding) => {
                                let (receiver, external) = binding.into_receiver();
                                tracing::trace!(component = %entry.name, port = %spec.name, external, "input bound");
                                bound_inputs += 1;
                                Some(receiver)
                            }
                            None => {
                                tracing::warn!(component = %entry.name, port = %spec.name, "input port is not bound and reads as closed");
                                None
                            }
                        };
                        ctx.insert_input(
                            InPort::new(spec.name.as_str(), receiver)
                                .tracked(status.clone())
                                .with_cancellation(token.clone()),
                        );
                    }
                    Direction::Out => {
                        let senders = entry.outputs.remove(&spec.name).unwrap_or_default();
                        if senders.is_empty() {
                            tracing::debug!(component = %entry.name, port = %spec.name, "output port is not connected; messages are discarded");
                        }
                        ctx.insert_output(
                            OutPort::new(spec.name.as_str(), senders)
                                .with_cancellation(token.clone()),
                        );
                    }
                }
            }
            status.track_inputs(bound_inputs);

            self.statuses.insert(entry.name.clone(), status.clone());
            launches.push(Launch {
                name: entry.name.clone(),
                component,
                ctx,
                status,
            });
        }
        Ok((launches, signal))
    }

    fn ensure_wiring(&self) -> Result<(), WiringError> {
        if self.is_started() {
            return Err(WiringError::AlreadyStarted);
        }
        Ok(())
    }

    fn entry_index(&self, component: &str) -> Result<usize, WiringError> {
        self.index
            .get(component)
            .copied()
            .ok_or_else(|| WiringError::UnknownComponent(component.to_string()))
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(Capacity::default())
    }
}

fn validate_listing(name: &str, ports: &[PortSpec]) -> Result<(), WiringError> {
    let malformed = |reason: String| WiringError::MalformedComponent {
        component: name.to_string(),
        reason,
    };
    if name.is_empty() {
        return Err(malformed("empty component name".to_string()));
    }

    let mut seen = HashSet::new();
    for spec in ports {
        if spec.name.is_empty() {
            return Err(malformed("empty port name".to_string()));
        }
        if !seen.insert(spec.name.as_str()) {
            return Err(malformed(format!("port '{}' declared twice", spec.name)));
        }
    }
    for direction in [Direction::In, Direction::Out] {
        let primaries = ports
            .iter()
            .filter(|spec| spec.primary && spec.direction == direction)
            .count();
        let exported = ports
            .iter()
            .filter(|spec| spec.exported && spec.direction == direction)
            .count();
        if primaries > 1 {
            return Err(malformed(format!("more than one primary {} port", direction)));
        }
        if exported > 1 {
            return Err(malformed(format!("more than one exported {} port", direction)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fbpcore::{ComponentError, Value};

    struct Probe {
        ports: Vec<PortSpec>,
    }

    impl Probe {
        fn boxed(ports: Vec<PortSpec>) -> Box<dyn Component> {
            Box::new(Probe { ports })
        }

        fn relay() -> Box<dyn Component> {
            Self::boxed(vec![
                PortSpec::input("in").primary(),
                PortSpec::output("out").primary(),
            ])
        }
    }

    #[async_trait]
    impl Component for Probe {
        fn component_type(&self) -> &str {
            "test.probe"
        }

        fn ports(&self) -> Vec<PortSpec> {
            self.ports.clone()
        }

        async fn execute(&mut self, _ctx: ComponentContext) -> Result<(), ComponentError> {
            Ok(())
        }
    }

    fn graph_with(names: &[&str]) -> Graph {
        let mut graph = Graph::default();
        for name in names {
            graph.add_component(*name, Probe::relay()).unwrap();
        }
        graph
    }

    #[test]
    fn duplicate_component_leaves_graph_unchanged() {
        let mut graph = graph_with(&["a"]);
        let err = graph.add_component("a", Probe::relay()).unwrap_err();

        assert_eq!(err, WiringError::DuplicateComponent("a".to_string()));
        assert_eq!(graph.component_names(), vec!["a"]);
    }

    #[test]
    fn malformed_listing_is_rejected() {
        let mut graph = Graph::default();
        let err = graph
            .add_component(
                "twice",
                Probe::boxed(vec![PortSpec::input("x"), PortSpec::output("x")]),
            )
            .unwrap_err();

        assert!(matches!(err, WiringError::MalformedComponent { .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn undeclared_port_is_a_capability_error() {
        let mut graph = graph_with(&["a", "b"]);
        let err = graph.connect("a", "nope", "b", "in").unwrap_err();

        assert!(matches!(
            err,
            FlowError::Capability(CapabilityError::UndeclaredPort { .. })
        ));
        assert!(graph.connections().is_empty());
    }

    #[test]
    fn wrong_direction_is_a_capability_error() {
        let mut graph = graph_with(&["a", "b"]);
        let err = graph.connect("a", "in", "b", "in").unwrap_err();

        assert!(matches!(
            err,
            FlowError::Capability(CapabilityError::WrongDirection {
                expected: Direction::Out,
                ..
            })
        ));
    }

    #[test]
    fn unknown_component_is_a_wiring_error() {
        let mut graph = graph_with(&["a"]);
        let err = graph.connect("a", "out", "ghost", "in").unwrap_err();

        assert!(matches!(
            err,
            FlowError::Wiring(WiringError::UnknownComponent(ref name)) if name == "ghost"
        ));
    }

    #[test]
    fn fan_in_on_one_port_is_rejected() {
        let mut graph = graph_with(&["a", "b", "c"]);
        graph.connect("a", "out", "c", "in").unwrap();
        let err = graph.connect("b", "out", "c", "in").unwrap_err();

        assert!(matches!(
            err,
            FlowError::Wiring(WiringError::ReceiverAlreadyBound { .. })
        ));
        assert_eq!(graph.connections().len(), 1);
    }

    #[test]
    fn fan_out_from_one_port_is_allowed() {
        let mut graph = graph_with(&["a", "b", "c"]);
        graph.connect("a", "out", "b", "in").unwrap();
        graph.connect("a", "out", "c", "in").unwrap();

        assert_eq!(graph.connections().len(), 2);
    }

    #[test]
    fn external_binding_excludes_connection() {
        let mut graph = graph_with(&["a", "b"]);
        graph.map_in_port("entry", "b", "in").unwrap();
        let (_tx, rx) = channel(Capacity::Unbuffered);
        graph.set_in_port("entry", rx).unwrap();

        let err = graph.connect("a", "out", "b", "in").unwrap_err();
        assert!(matches!(
            err,
            FlowError::Wiring(WiringError::ReceiverAlreadyBound { .. })
        ));

        let (_tx2, rx2) = channel(Capacity::Unbuffered);
        assert!(matches!(
            graph.set_in_port("entry", rx2),
            Err(WiringError::ReceiverAlreadyBound { .. })
        ));
    }

    #[test]
    fn exports_are_validated() {
        let mut graph = graph_with(&["a"]);
        graph.map_out_port("result", "a", "out").unwrap();

        assert!(matches!(
            graph.map_out_port("result", "a", "out"),
            Err(FlowError::Wiring(WiringError::DuplicateExport(_)))
        ));
        assert!(matches!(
            graph.map_in_port("wrong", "a", "out"),
            Err(FlowError::Capability(CapabilityError::WrongDirection { .. }))
        ));
        let (tx, _rx) = channel(Capacity::Unbuffered);
        assert_eq!(
            graph.set_out_port("missing", tx),
            Err(WiringError::UnknownExport("missing".to_string()))
        );
    }

    #[test]
    fn downstream_first_reverses_topological_order() {
        let mut graph = graph_with(&["source", "middle", "sink"]);
        graph.connect("source", "out", "middle", "in").unwrap();
        graph.connect("middle", "out", "sink", "in").unwrap();

        assert_eq!(
            graph.startup_order(StartupOrder::DownstreamFirst),
            vec!["sink", "middle", "source"]
        );
        assert_eq!(
            graph.startup_order(StartupOrder::Registration),
            vec!["source", "middle", "sink"]
        );
    }

    #[test]
    fn cycles_fall_back_to_registration_order() {
        let mut graph = graph_with(&["a", "b"]);
        graph.connect("a", "out", "b", "in").unwrap();
        graph.connect("b", "out", "a", "in").unwrap();

        assert!(graph.is_cyclic());
        assert_eq!(
            graph.startup_order(StartupOrder::DownstreamFirst),
            vec!["a", "b"]
        );
    }

    #[tokio::test]
    async fn launch_freezes_topology() {
        let mut graph = graph_with(&["a", "b"]);
        graph.connect("a", "out", "b", "in").unwrap();
        let bus = EventBus::new(16);

        let (mut launches, _signal) = graph
            .launch(
                NetworkId::new_v4(),
                &bus,
                &CancellationToken::new(),
                StartupOrder::Registration,
            )
            .unwrap();

        assert_eq!(launches.len(), 2);
        assert!(graph.is_started());
        assert_eq!(graph.state("a"), Some(ComponentState::NotStarted));
        assert!(matches!(
            graph.add_component("late", Probe::relay()),
            Err(WiringError::AlreadyStarted)
        ));
        assert!(matches!(
            graph.connect("b", "out", "a", "in"),
            Err(FlowError::Wiring(WiringError::AlreadyStarted))
        ));

        // the channel created by connect is live between the two launches
        let mut out = launches[0].ctx.take_output("out").unwrap();
        let mut input = launches[1].ctx.take_input("in").unwrap();
        let send = tokio::spawn(async move { out.send(5).await });
        assert_eq!(input.recv().await, Some(Value::Number(5.0)));
        assert!(send.await.unwrap().is_ok());
    }
}
