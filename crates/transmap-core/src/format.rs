//! Document formats for schema and profile files.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A supported text format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Toml,
}

impl Format {
    /// Detect format from file path extension.
    pub fn from_path(path: &str) -> Option<Self> {
        let (_, ext) = path.rsplit_once('.')?;
        Self::from_name(ext)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            "toml" => Some(Format::Toml),
            _ => None,
        }
    }

    /// Format for `path`, falling back to YAML.
    pub fn detect(path: Option<&str>) -> Self {
        path.and_then(Self::from_path).unwrap_or(Format::Yaml)
    }

    pub fn parse<T: DeserializeOwned>(self, data: &[u8]) -> Result<T, String> {
        match self {
            Format::Json => serde_json::from_slice(data).map_err(|e| e.to_string()),
            Format::Yaml => serde_yaml::from_slice(data).map_err(|e| e.to_string()),
            Format::Toml => {
                let s = std::str::from_utf8(data).map_err(|e| format!("Invalid UTF-8: {}", e))?;
                toml::from_str(s).map_err(|e| e.to_string())
            }
        }
    }

    pub fn render<T: Serialize>(self, value: &T) -> Result<Vec<u8>, String> {
        match self {
            Format::Json => serde_json::to_vec_pretty(value).map_err(|e| e.to_string()),
            Format::Yaml => serde_yaml::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| e.to_string()),
            Format::Toml => toml::to_string_pretty(value)
                .map(String::into_bytes)
                .map_err(|e| e.to_string()),
        }
    }
}

/// Parse `data` using the format named by `format` (`json`, `yaml`, `toml`).
pub(crate) fn parse_named<T: DeserializeOwned>(data: &[u8], format: &str) -> Result<T, String> {
    let format = Format::from_name(format).ok_or_else(|| format!("Unsupported format: {}", format))?;
    format.parse(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format() {
        assert_eq!(Format::from_path("rules.json"), Some(Format::Json));
        assert_eq!(Format::from_path("a/b/rules.YML"), Some(Format::Yaml));
        assert_eq!(Format::from_path("rules.toml"), Some(Format::Toml));
        assert_eq!(Format::from_path("rules"), None);
        assert_eq!(Format::detect(None), Format::Yaml);
    }

    #[test]
    fn test_unsupported_format() {
        let err = parse_named::<serde_json::Value>(b"{}", "ron").unwrap_err();
        assert!(err.contains("ron"));
    }
}
