use async_trait::async_trait;
use fbpcore::{Component, ComponentContext, ComponentError, PortSpec, Value};

pub(crate) const MAP_TYPE: &str = "transform.map";
pub(crate) const FILTER_TYPE: &str = "transform.filter";
pub(crate) const JSON_PARSE_TYPE: &str = "transform.json_parse";
pub(crate) const JSON_STRINGIFY_TYPE: &str = "transform.json_stringify";

type MapFn = Box<dyn Fn(Value) -> Result<Value, ComponentError> + Send + Sync>;
type Predicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;

fn stream_ports() -> Vec<PortSpec> {
    vec![
        PortSpec::input("in").primary(),
        PortSpec::output("out").primary(),
    ]
}

/// Apply a function to every value from `in` and send the result on `out`.
///
/// An error returned by the function stops the component.
pub struct Map {
    name: String,
    apply: MapFn,
}

impl Map {
    pub fn new<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self::try_new(name, move |value| Ok(apply(value)))
    }

    pub fn try_new<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(Value) -> Result<Value, ComponentError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            apply: Box::new(apply),
        }
    }
}

#[async_trait]
impl Component for Map {
    fn component_type(&self) -> &str {
        MAP_TYPE
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> Vec<PortSpec> {
        stream_ports()
    }

    async fn execute(&mut self, mut ctx: ComponentContext) -> Result<(), ComponentError> {
        let mut input = ctx.take_input("in")?;
        let mut out = ctx.take_output("out")?;
        while let Some(value) = input.recv().await {
            out.send((self.apply)(value)?).await?;
        }
        Ok(())
    }
}

/// Forward only the values for which the predicate holds
pub struct Filter {
    name: String,
    keep: Predicate,
}

impl Filter {
    pub fn new<F>(name: impl Into<String>, keep: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            keep: Box::new(keep),
        }
    }
}

#[async_trait]
impl Component for Filter {
    fn component_type(&self) -> &str {
        FILTER_TYPE
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> Vec<PortSpec> {
        stream_ports()
    }

    async fn execute(&mut self, mut ctx: ComponentContext) -> Result<(), ComponentError> {
        let mut input = ctx.take_input("in")?;
        let mut out = ctx.take_output("out")?;
        let mut dropped = 0usize;
        while let Some(value) = input.recv().await {
            if (self.keep)(&value) {
                out.send(value).await?;
            } else {
                dropped += 1;
            }
        }
        tracing::debug!(component = %self.name, dropped, "filter finished");
        Ok(())
    }
}

/// Parse JSON strings into `Value::Json`
pub struct JsonParse {
    name: String,
}

impl JsonParse {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Component for JsonParse {
    fn component_type(&self) -> &str {
        JSON_PARSE_TYPE
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> Vec<PortSpec> {
        stream_ports()
    }

    async fn execute(&mut self, mut ctx: ComponentContext) -> Result<(), ComponentError> {
        let mut input = ctx.take_input("in")?;
        let mut out = ctx.take_output("out")?;
        while let Some(value) = input.recv().await {
            let text = value.as_str().ok_or_else(|| ComponentError::InvalidMessage {
                port: "in".to_string(),
                expected: "string".to_string(),
                actual: value.type_name().to_string(),
            })?;

            let parsed: serde_json::Value = serde_json::from_str(text)
                .map_err(|e| ComponentError::ExecutionFailed(format!("JSON parse error: {}", e)))?;

            out.send(Value::Json(parsed)).await?;
        }
        Ok(())
    }
}

/// Serialize values to JSON strings.
///
/// `Value::Json` payloads are written as plain JSON; other variants keep
/// their tagged form.
pub struct JsonStringify {
    name: String,
    pretty: bool,
}

impl JsonStringify {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pretty: false,
        }
    }

    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    fn render(&self, value: &Value) -> Result<String, serde_json::Error> {
        match (value, self.pretty) {
            (Value::Json(json), true) => serde_json::to_string_pretty(json),
            (Value::Json(json), false) => serde_json::to_string(json),
            (other, true) => serde_json::to_string_pretty(other),
            (other, false) => serde_json::to_string(other),
        }
    }
}

#[async_trait]
impl Component for JsonStringify {
    fn component_type(&self) -> &str {
        JSON_STRINGIFY_TYPE
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> Vec<PortSpec> {
        stream_ports()
    }

    async fn execute(&mut self, mut ctx: ComponentContext) -> Result<(), ComponentError> {
        let mut input = ctx.take_input("in")?;
        let mut out = ctx.take_output("out")?;
        while let Some(value) = input.recv().await {
            let json_str = self.render(&value).map_err(|e| {
                ComponentError::ExecutionFailed(format!("JSON stringify error: {}", e))
            })?;
            out.send(json_str).await?;
        }
        Ok(())
    }
}
