use std::path::Path;

use serde_json::Value;

use crate::error::{ExaError, Result};

/// `@path` reads the file; anything else is taken literally.
pub fn read_arg_or_file(value: &str) -> Result<String> {
    match value.strip_prefix('@') {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => Ok(value.to_owned()),
    }
}

pub fn read_json_file(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|err| {
        ExaError::InvalidRequest(format!("{} is not valid JSON: {err}", path.display()))
    })
}
