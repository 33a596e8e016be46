use async_trait::async_trait;
use fbpcore::{Component, ComponentContext, ComponentError, PortSpec, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

pub(crate) const COMPONENT_TYPE: &str = "core.collector";

/// Stores everything that arrives on `in` until the input closes
pub struct Collector {
    name: String,
    values: Arc<Mutex<Vec<Value>>>,
}

/// Read side of a [`Collector`], usable after the component moved into a network
#[derive(Debug, Clone, Default)]
pub struct CollectorHandle {
    values: Arc<Mutex<Vec<Value>>>,
}

impl CollectorHandle {
    /// Snapshot of the values received so far
    pub async fn values(&self) -> Vec<Value> {
        self.values.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.values.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.lock().await.is_empty()
    }
}

impl Collector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Arc::default(),
        }
    }

    pub fn handle(&self) -> CollectorHandle {
        CollectorHandle {
            values: self.values.clone(),
        }
    }
}

#[async_trait]
impl Component for Collector {
    fn component_type(&self) -> &str {
        COMPONENT_TYPE
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input("in").primary()]
    }

    async fn execute(&mut self, mut ctx: ComponentContext) -> Result<(), ComponentError> {
        let mut input = ctx.take_input("in")?;
        while let Some(value) = input.recv().await {
            self.values.lock().await.push(value);
        }
        Ok(())
    }
}
