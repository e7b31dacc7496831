pub mod file;
pub mod stdin;

use serde::de::DeserializeOwned;
use tracing::debug;

/// Payload from `--input`, falling back to piped stdin.
pub fn load<T: DeserializeOwned>(
    path: Option<&str>,
    what: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        debug!(path, what, "reading input file");
        return file::read_input(path);
    }
    if let Some(text) = stdin::piped_text()? {
        debug!(what, bytes = text.len(), "reading JSON from stdin");
        return serde_json::from_str(&text)
            .map_err(|e| format!("Failed to parse stdin as JSON: {e}").into());
    }
    Err(format!("--input <file.json|file.yaml> or stdin required for {what}").into())
}
