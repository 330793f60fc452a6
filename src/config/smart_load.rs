use figment::providers::{Data, Format, Json, Toml, Yaml};
use std::path::Path;

/// Provider for a config file whose format is chosen by extension.
///
/// `--config` accepts any file name, so for unknown extensions the format is
/// sniffed from the content, falling back to TOML.
pub fn auto<P: AsRef<Path>>(path: P) -> impl figment::Provider {
    let path = path.as_ref();
    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("").to_lowercase();

    let format = match extension.as_str() {
        "toml" => ConfigFormat::Toml,
        "json" => ConfigFormat::Json,
        "yaml" | "yml" => ConfigFormat::Yaml,
        _ => match std::fs::read_to_string(path) {
            Ok(content) => detect_format_from_content(&content).unwrap_or_else(|| {
                tracing::debug!("Could not detect format of {}, defaulting to TOML", path.display());
                ConfigFormat::Toml
            }),
            Err(_) => ConfigFormat::Toml,
        },
    };

    match format {
        ConfigFormat::Toml => SmartProvider::Toml(Toml::file(path)),
        ConfigFormat::Json => SmartProvider::Json(Json::file(path)),
        ConfigFormat::Yaml => SmartProvider::Yaml(Yaml::file(path)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Json,
    Yaml,
}

/// Wrapper enum to handle different provider types
enum SmartProvider {
    Toml(Data<Toml>),
    Json(Data<Json>),
    Yaml(Data<Yaml>),
}

impl figment::Provider for SmartProvider {
    fn metadata(&self) -> figment::Metadata {
        match self {
            SmartProvider::Toml(p) => p.metadata(),
            SmartProvider::Json(p) => p.metadata(),
            SmartProvider::Yaml(p) => p.metadata(),
        }
    }

    fn data(&self) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        match self {
            SmartProvider::Toml(p) => p.data(),
            SmartProvider::Json(p) => p.data(),
            SmartProvider::Yaml(p) => p.data(),
        }
    }
}

fn detect_format_from_content(content: &str) -> Option<ConfigFormat> {
    let trimmed = content.trim();

    if (trimmed.starts_with('{') && trimmed.ends_with('}')) || (trimmed.starts_with('[') && trimmed.ends_with(']'))
    {
        // `[sync]` alone is also a valid TOML document
        if !trimmed.lines().any(|line| line.trim().starts_with("[[") || line.contains('=')) {
            return Some(ConfigFormat::Json);
        }
    }

    let lines = || trimmed.lines().map(str::trim).filter(|line| !line.is_empty() && !line.starts_with('#'));

    if lines().any(|line| (line.starts_with('[') && line.ends_with(']')) || (line.contains('=') && !line.contains(':')))
    {
        return Some(ConfigFormat::Toml);
    }

    if trimmed.starts_with("---") || lines().any(|line| line.contains(": ") || line.ends_with(':')) {
        return Some(ConfigFormat::Yaml);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(detect_format_from_content(r#"{"sync": {"concurrency": 2}}"#), Some(ConfigFormat::Json));
        assert_eq!(detect_format_from_content("sync:\n  concurrency: 2"), Some(ConfigFormat::Yaml));
        assert_eq!(detect_format_from_content("[sync]\nconcurrency = 2"), Some(ConfigFormat::Toml));
        assert_eq!(
            detect_format_from_content("[[repos]]\nsource = \"https://h/g/a.git\""),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(detect_format_from_content(""), None);
    }
}
