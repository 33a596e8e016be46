use async_trait::async_trait;
use fbpcore::{Component, ComponentContext, ComponentError, PortSpec};
use tokio::time::{sleep, Duration};

pub(crate) const COMPONENT_TYPE: &str = "time.delay";

/// Hold each value for a fixed duration before forwarding it
pub struct Delay {
    name: String,
    delay: Duration,
}

impl Delay {
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }

    pub fn from_millis(name: impl Into<String>, delay_ms: u64) -> Self {
        Self::new(name, Duration::from_millis(delay_ms))
    }
}

#[async_trait]
impl Component for Delay {
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
        ctx.events
            .info(format!("Delaying each message by {}ms", self.delay.as_millis()));

        while let Some(value) = input.recv().await {
            tokio::select! {
                _ = ctx.cancellation.cancelled() => return Ok(()),
                _ = sleep(self.delay) => {}
            }
            out.send(value).await?;
        }
        Ok(())
    }
}
