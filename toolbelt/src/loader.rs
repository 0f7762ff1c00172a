//! Loading tool units from disk
//!
//! A unit is a markdown file with YAML front matter declaring `description`
//! and `input_schema`, followed by a Liquid template body that acts as the
//! tool's executable part:
//!
//! ```markdown
//! ---
//! description: Says hello
//! input_schema:
//!   type: object
//!   properties:
//!     name:
//!       type: string
//!   required: [name]
//! ---
//! Hello, {{ name }}!
//! ```
//!
//! Every call to [`UnitLoader::load`] reads the file again and compiles a new
//! template. Nothing is cached per path, which is what makes hot reload work.

use crate::tool::{OutputMode, TemplateExecutor, ToolDefinition};
use crate::{Result, ToolbeltError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

/// Separator between a unit's own description and the provenance footer
pub const DESCRIPTION_SEPARATOR: &str = "---";

/// Note appended to every description
pub const HOT_RELOAD_NOTE: &str =
    "This tool is loaded dynamically. Editing its source file changes its behavior immediately.";

const FRONT_MATTER_FENCE: &str = "---";

/// Loads a single unit file into a [`ToolDefinition`]
#[async_trait]
pub trait UnitLoader: Send + Sync {
    /// Load the unit at `path` from its current on-disk content.
    ///
    /// # Errors
    ///
    /// [`ToolbeltError::ImportFailure`] if the file cannot be read or parsed,
    /// [`ToolbeltError::InvalidUnit`] if a required export is missing.
    async fn load(&self, path: &Path) -> Result<ToolDefinition>;
}

/// The tool name a unit file registers under: its base name without extension
pub fn unit_name(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

/// Build the final description: the unit's own text plus provenance
pub fn augment_description(description: &str, path: &Path) -> String {
    format!(
        "{}\n\n{}\nSource: {}\n{}",
        description.trim_end(),
        DESCRIPTION_SEPARATOR,
        path.display(),
        HOT_RELOAD_NOTE
    )
}

/// Loader for markdown units with a Liquid template body
pub struct TemplateUnitLoader {
    parser: liquid::Parser,
}

impl TemplateUnitLoader {
    /// Create a loader using the Liquid standard filter library
    pub fn new() -> Result<Self> {
        let parser = liquid::ParserBuilder::with_stdlib()
            .build()
            .map_err(|e| ToolbeltError::Other(format!("Failed to build Liquid parser: {e}")))?;
        Ok(Self { parser })
    }

    /// Parse unit content that has already been read from `path`
    pub fn load_from_string(&self, path: &Path, content: &str) -> Result<ToolDefinition> {
        let name = unit_name(path)
            .ok_or_else(|| ToolbeltError::import_failure(path, "file name is not valid UTF-8"))?;

        let (front_matter, body) = split_front_matter(content)
            .ok_or_else(|| ToolbeltError::import_failure(path, "unterminated front matter"))?;

        let metadata: Map<String, Value> = match front_matter {
            Some(yaml) if !yaml.trim().is_empty() => {
                match serde_yaml::from_str::<Value>(yaml)
                    .map_err(|e| ToolbeltError::import_failure(path, e))?
                {
                    Value::Object(map) => map,
                    Value::Null => Map::new(),
                    _ => {
                        return Err(ToolbeltError::import_failure(
                            path,
                            "front matter is not a mapping",
                        ))
                    }
                }
            }
            _ => Map::new(),
        };

        let template = self
            .parser
            .parse(body)
            .map_err(|e| ToolbeltError::import_failure(path, e))?;

        let description = match metadata.get("description") {
            Some(Value::String(description)) => description,
            Some(_) => return Err(ToolbeltError::invalid_unit(path, "'description' is not a string")),
            None => return Err(ToolbeltError::invalid_unit(path, "missing 'description'")),
        };

        let input_schema = match metadata.get("input_schema").or_else(|| metadata.get("inputSchema")) {
            Some(Value::Object(schema)) => schema.clone(),
            Some(_) => return Err(ToolbeltError::invalid_unit(path, "'input_schema' is not an object")),
            None => return Err(ToolbeltError::invalid_unit(path, "missing 'input_schema'")),
        };

        if body.trim().is_empty() {
            return Err(ToolbeltError::invalid_unit(path, "missing template body"));
        }

        let output = match metadata.get("output") {
            Some(value) => serde_json::from_value::<OutputMode>(value.clone()).map_err(|_| {
                ToolbeltError::invalid_unit(path, format!("unsupported output mode {value}"))
            })?,
            None => OutputMode::default(),
        };

        let executor = TemplateExecutor::new(name, template, required_arguments(&input_schema), output);

        Ok(ToolDefinition::new(
            name,
            augment_description(description, path),
            input_schema,
            path,
            Arc::new(executor),
        ))
    }
}

#[async_trait]
impl UnitLoader for TemplateUnitLoader {
    async fn load(&self, path: &Path) -> Result<ToolDefinition> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ToolbeltError::import_failure(path, e))?;
        self.load_from_string(path, &content)
    }
}

/// Split `---` fenced front matter from the body.
///
/// Returns `None` when an opening fence has no closing fence, and
/// `Some((None, content))` when there is no front matter at all.
fn split_front_matter(content: &str) -> Option<(Option<&str>, &str)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let Some(first_line_end) = content.find('\n') else {
        return Some((None, content));
    };
    if content[..first_line_end].trim_end() != FRONT_MATTER_FENCE {
        return Some((None, content));
    }

    let rest = &content[first_line_end + 1..];
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FRONT_MATTER_FENCE {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((Some(yaml), body.trim_start_matches(['\r', '\n'])));
        }
        offset += line.len();
    }
    None
}

fn required_arguments(schema: &Map<String, Value>) -> Vec<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|required| {
            required
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
