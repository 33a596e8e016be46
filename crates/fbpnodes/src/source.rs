use async_trait::async_trait;
use fbpcore::{Component, ComponentContext, ComponentError, PortSpec, Value};

pub(crate) const COMPONENT_TYPE: &str = "core.source";

/// Emits a fixed sequence on `out`, then finishes.
///
/// Finishing releases the port, which closes the downstream connection.
pub struct Source {
    name: String,
    values: Vec<Value>,
}

impl Source {
    pub fn new<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Component for Source {
    fn component_type(&self) -> &str {
        COMPONENT_TYPE
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output("out").primary()]
    }

    async fn execute(&mut self, mut ctx: ComponentContext) -> Result<(), ComponentError> {
        let mut out = ctx.take_output("out")?;
        let total = self.values.len();
        for value in self.values.drain(..) {
            out.send(value).await?;
        }
        tracing::debug!(component = %self.name, sent = total, "source exhausted");
        Ok(())
    }
}
