//! Reading component specifications from files and interactive input.

use std::io::{self, BufRead};
use std::path::Path;

use serde_json::Value;

use super::WorkflowError;

/// Transformation shown to interactive users and used when they enter
/// nothing.
pub const EXAMPLE_TRANSFORMATION: &str = "context:
- operation: add
  paths:
  - key: source
    value: some-test-source
data:
- operation: store
  paths:
  - key: $foo
    value: Body
- operation: delete
  paths:
  - key:
- operation: add
  paths:
  - key: foo
    value: $foo
";

/// Read lines until the first empty line or end of input.
///
/// Leading and trailing newlines are trimmed from the result.
pub fn read_until_blank<R: BufRead>(reader: R) -> io::Result<String> {
  let mut collected = String::new();
  for line in reader.lines() {
    let line = line?;
    if line.is_empty() {
      break;
    }
    collected.push('\n');
    collected.push_str(&line);
  }
  Ok(collected.trim_matches('\n').to_string())
}

/// Parse a YAML specification document. The document must be a mapping.
pub fn parse_spec(text: &str) -> Result<Value, WorkflowError> {
  if text.trim().is_empty() {
    return Ok(Value::Object(Default::default()));
  }
  let value: Value = serde_yaml::from_str(text).map_err(|e| WorkflowError::Spec(e.to_string()))?;
  match value {
    Value::Object(_) => Ok(value),
    Value::Null => Ok(Value::Object(Default::default())),
    other => Err(WorkflowError::Spec(format!(
      "expected a mapping, found {}",
      kind_of(&other)
    ))),
  }
}

/// Parse the specification typed interactively, falling back to
/// [`EXAMPLE_TRANSFORMATION`] when nothing was entered.
pub fn parse_interactive(text: &str) -> Result<Value, WorkflowError> {
  if text.trim().is_empty() {
    return parse_spec(EXAMPLE_TRANSFORMATION);
  }
  parse_spec(text)
}

/// Read and parse a specification file.
pub fn read_spec_file(path: &Path) -> Result<Value, WorkflowError> {
  let text = std::fs::read_to_string(path).map_err(|source| WorkflowError::Input {
    path: path.to_path_buf(),
    source,
  })?;
  parse_spec(&text)
}

fn kind_of(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "a sequence",
    Value::Object(_) => "a mapping",
  }
}
