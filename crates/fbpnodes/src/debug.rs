use async_trait::async_trait;
use fbpcore::{Component, ComponentContext, ComponentError, PortSpec};

pub(crate) const COMPONENT_TYPE: &str = "debug.log";

/// Logs every value passing through and forwards it unchanged.
///
/// `out` may be left unconnected, in which case the logger is a sink.
pub struct Logger {
    name: String,
    prefix: String,
}

impl Logger {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: "DEBUG".to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

#[async_trait]
impl Component for Logger {
    fn component_type(&self) -> &str {
        COMPONENT_TYPE
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input("in").primary(),
            PortSpec::output("out").primary(),
        ]
    }

    async fn execute(&mut self, mut ctx: ComponentContext) -> Result<(), ComponentError> {
        let mut input = ctx.take_input("in")?;
        let mut out = ctx.take_output("out")?;
        while let Some(value) = input.recv().await {
            tracing::info!(component = %self.name, ?value, "{}", self.prefix);
            ctx.events.info(format!("{}: {:?}", self.prefix, value));
            out.send(value).await?;
        }
        Ok(())
    }
}
