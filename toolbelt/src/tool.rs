//! Tool definitions and their executors

use crate::{Result, ToolbeltError};
use async_trait::async_trait;
use liquid::model::Value as LiquidValue;
use liquid::Object;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Named arguments passed to a tool executor
pub type ToolArguments = Map<String, Value>;

/// Asynchronous callable backing a tool
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run the tool with the given arguments and produce its result
    async fn execute(&self, arguments: ToolArguments) -> Result<Value>;
}

/// How the rendered output of a template tool becomes a result value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Result is the rendered text as a JSON string
    #[default]
    Text,
    /// Rendered text is parsed as a JSON document
    Json,
}

/// Immutable snapshot of one loaded tool unit
#[derive(Clone)]
pub struct ToolDefinition {
    name: String,
    description: String,
    input_schema: Map<String, Value>,
    source: PathBuf,
    executor: Arc<dyn ToolExecutor>,
}

impl ToolDefinition {
    /// Create a definition from its parts
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Map<String, Value>,
        source: impl Into<PathBuf>,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            source: source.into(),
            executor,
        }
    }

    /// Registry key, the unit file's base name without extension
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description including provenance
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Input schema exactly as the unit declared it
    pub fn input_schema(&self) -> &Map<String, Value> {
        &self.input_schema
    }

    /// File this definition was loaded from
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Invoke the executor
    pub async fn execute(&self, arguments: ToolArguments) -> Result<Value> {
        self.executor.execute(arguments).await
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Two definitions are equal when they came from the same file with the same
/// metadata. Executors are not comparable and are ignored.
impl PartialEq for ToolDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.input_schema == other.input_schema
            && self.source == other.source
    }
}

/// Executor rendering a compiled Liquid template
pub struct TemplateExecutor {
    tool: String,
    template: liquid::Template,
    required: Vec<String>,
    output: OutputMode,
}

impl TemplateExecutor {
    /// Wrap a compiled template.
    ///
    /// `required` lists argument names that must be present before rendering.
    pub fn new(
        tool: impl Into<String>,
        template: liquid::Template,
        required: Vec<String>,
        output: OutputMode,
    ) -> Self {
        Self {
            tool: tool.into(),
            template,
            required,
            output,
        }
    }

    fn to_globals(&self, arguments: &ToolArguments) -> Result<Object> {
        let mut globals = Object::new();
        for (key, value) in arguments {
            let value: LiquidValue = liquid::model::to_value(value)
                .map_err(|e| ToolbeltError::execution(&self.tool, e))?;
            globals.insert(key.clone().into(), value);
        }
        Ok(globals)
    }
}

#[async_trait]
impl ToolExecutor for TemplateExecutor {
    async fn execute(&self, arguments: ToolArguments) -> Result<Value> {
        if let Some(missing) = self.required.iter().find(|r| !arguments.contains_key(*r)) {
            return Err(ToolbeltError::execution(
                &self.tool,
                format!("Required argument '{missing}' not provided"),
            ));
        }

        let globals = self.to_globals(&arguments)?;
        let rendered = self
            .template
            .render(&globals)
            .map_err(|e| ToolbeltError::execution(&self.tool, e))?;

        match self.output {
            OutputMode::Text => Ok(Value::String(rendered)),
            OutputMode::Json => serde_json::from_str(rendered.trim())
                .map_err(|e| ToolbeltError::execution(&self.tool, format!("invalid JSON output: {e}"))),
        }
    }
}
