//! Terminal input helpers.

use std::io::{self, Write};

use anyhow::Result;

/// Read one trimmed line. An empty answer falls back to `default`.
pub fn prompt_line(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(d) if !d.is_empty() => print!("{} [{}]: ", label, d),
        _ => print!("{}: ", label),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    if input.is_empty() {
        Ok(default.unwrap_or_default().to_string())
    } else {
        Ok(input.to_string())
    }
}

/// Read a password without echo
pub fn prompt_password(label: &str) -> Result<String> {
    let password = rpassword::prompt_password(format!("{}: ", label))?;
    Ok(password)
}

/// Use the value given on the command line, or ask for it
pub fn value_or_prompt(value: Option<String>, label: &str, default: Option<&str>) -> Result<String> {
    match value {
        Some(v) => Ok(v),
        None => prompt_line(label, default),
    }
}
