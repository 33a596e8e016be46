use async_trait::async_trait;
use fbpcore::{Component, ComponentContext, ComponentError, InPort, PortSpec};
use futures::stream::{self, StreamExt};

pub(crate) const COMPONENT_TYPE: &str = "core.merge";

/// Explicit fan-in: reads `in0..inN` concurrently and forwards to `out`.
///
/// Per-input order is preserved; interleaving between inputs is not
/// specified. `out` closes once every input has closed.
pub struct Merge {
    name: String,
    inputs: usize,
}

impl Merge {
    pub fn new(name: impl Into<String>, inputs: usize) -> Self {
        Self {
            name: name.into(),
            inputs,
        }
    }

    /// Name of the `index`-th input port
    pub fn input(index: usize) -> String {
        format!("in{index}")
    }
}

#[async_trait]
impl Component for Merge {
    fn component_type(&self) -> &str {
        COMPONENT_TYPE
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> Vec<PortSpec> {
        let mut ports: Vec<PortSpec> = (0..self.inputs)
            .map(|index| PortSpec::input(Self::input(index)))
            .collect();
        if let Some(first) = ports.first_mut() {
            first.primary = true;
        }
        ports.push(PortSpec::output("out").primary());
        ports
    }

    async fn execute(&mut self, mut ctx: ComponentContext) -> Result<(), ComponentError> {
        let mut out = ctx.take_output("out")?;
        let streams = ctx.take_inputs().into_iter().map(|port: InPort| {
            stream::unfold(port, |mut port| async move {
                port.recv().await.map(|value| (value, port))
            })
            .boxed()
        });
        let mut merged = stream::select_all(streams);

        while let Some(value) = merged.next().await {
            out.send(value).await?;
        }
        Ok(())
    }
}
