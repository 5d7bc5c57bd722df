pub mod file;
pub mod stdin;

use serde::de::DeserializeOwned;

/// Parse a JSON or YAML document. JSON is tried first for its sharper error
/// messages; anything else is handed to the YAML parser.
pub fn parse_document<T: DeserializeOwned>(
    text: &str,
    origin: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return serde_json::from_str(text)
            .map_err(|e| format!("Failed to parse {origin} as JSON: {e}").into());
    }
    serde_yaml::from_str(text).map_err(|e| format!("Failed to parse {origin} as YAML: {e}").into())
}

/// Read a typed document from `--input` or, failing that, from piped stdin.
pub fn read_input<T: DeserializeOwned>(
    path: Option<&str>,
) -> Result<Option<T>, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        return file::read_document(path).map(Some);
    }
    match stdin::read_stdin()? {
        Some(text) => parse_document(&text, "stdin").map(Some),
        None => Ok(None),
    }
}
