use crate::error::{CliError, CliResult};
use crate::exit_codes::{EXIT_SUCCESS, EXIT_WARNING};
use serde_json::Value;
use toolbelt::{ToolArguments, Toolbelt};

/// Build the argument map from `--json` and `--arg key=value` pairs
pub fn parse_arguments(json: Option<&str>, pairs: &[String]) -> CliResult<ToolArguments> {
    let mut arguments = match json {
        Some(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(CliError::new("--json must be a JSON object", EXIT_WARNING)),
            Err(e) => return Err(CliError::from_error(e, EXIT_WARNING)),
        },
        None => ToolArguments::new(),
    };

    for pair in pairs {
        let (key, raw) = pair.split_once('=').ok_or_else(|| {
            CliError::new(
                format!("Invalid argument '{pair}', expected key=value"),
                EXIT_WARNING,
            )
        })?;
        if key.is_empty() {
            return Err(CliError::new(
                format!("Invalid argument '{pair}', key is empty"),
                EXIT_WARNING,
            ));
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        arguments.insert(key.to_string(), value);
    }

    Ok(arguments)
}

pub async fn run_call_command(
    toolbelt: &Toolbelt,
    name: &str,
    pairs: &[String],
    json: Option<&str>,
) -> CliResult<i32> {
    let arguments = parse_arguments(json, pairs)?;
    tracing::debug!("Calling '{}' with {:?}", name, arguments);

    let result = toolbelt.call_tool(name, arguments).await?;
    match result {
        Value::String(text) => println!("{text}"),
        other => println!(
            "{}",
            serde_json::to_string_pretty(&other).map_err(|e| CliError::from_error(e, EXIT_WARNING))?
        ),
    }
    Ok(EXIT_SUCCESS)
}
