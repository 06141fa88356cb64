use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;

pub fn to_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(text)
}

/// Writes one complete JSON document followed by a newline, then flushes so a
/// consumer reading line by line sees it immediately.
pub fn write_json<W, T>(out: &mut W, value: &T, pretty: bool) -> Result<()>
where
    W: Write + ?Sized,
    T: Serialize + ?Sized,
{
    let text = to_json(value, pretty)?;
    writeln!(out, "{text}")?;
    out.flush()?;
    Ok(())
}

pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T, pretty: bool) -> Result<()> {
    let text = to_json(value, pretty)?;
    std::fs::write(path, format!("{text}\n"))?;
    Ok(())
}
