use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// `export_json = ""` in a config file means "no export".
fn empty_path_none<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let path = Option::<PathBuf>::deserialize(deserializer)?;
    Ok(path.filter(|p| !p.as_os_str().is_empty()))
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read config {}: {}", path.display(), source)
            }
            ConfigError::Parse(err) => write!(f, "config parse error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(err) => Some(err),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub decode: DecodeConfig,
    pub stats: StatsConfig,
    pub run: RunConfig,
    pub output: OutputConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(ConfigError::Parse)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Unwrap a single 802.1Q tag before looking for IPv4.
    pub vlan: bool,
    /// Accept records cut short by the capture snaplen, measuring their IPv4
    /// length against the original wire length. Off by default: the total
    /// length must then fit in the captured bytes.
    pub accept_snapped: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        DecodeConfig {
            vlan: true,
            accept_snapped: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Restrict aggregates to complete connections (SYN and FIN seen, no RST).
    pub complete_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Stop after this many records (0 = read the whole file).
    pub count: u64,
    /// Read and decode on a separate thread.
    pub pipelined: bool,
    /// Capacity of the decode -> tracker channel in pipelined mode.
    pub channel_capacity: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            count: 0,
            pipelined: false,
            channel_capacity: 4096,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    #[serde(deserialize_with = "empty_path_none")]
    pub export_json: Option<PathBuf>,
    #[serde(deserialize_with = "empty_path_none")]
    pub export_csv: Option<PathBuf>,
    /// Skip the per-connection section of the console report.
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert!(config.decode.vlan);
        assert!(!config.decode.accept_snapped);
        assert!(!config.stats.complete_only);
        assert_eq!(config.run.count, 0);
        assert!(!config.run.pipelined);
        assert_eq!(config.run.channel_capacity, 4096);
        assert!(config.output.export_json.is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let raw = r#"
            [decode]
            vlan = false
            accept_snapped = true

            [stats]
            complete_only = true

            [run]
            count = 500
            pipelined = true

            [output]
            export_json = "out.json"
            export_csv = ""
            quiet = true
        "#;
        let config = Config::parse(raw).unwrap();
        assert!(!config.decode.vlan);
        assert!(config.decode.accept_snapped);
        assert!(config.stats.complete_only);
        assert_eq!(config.run.count, 500);
        assert!(config.run.pipelined);
        assert_eq!(config.run.channel_capacity, 4096);
        assert_eq!(config.output.export_json, Some(PathBuf::from("out.json")));
        assert_eq!(config.output.export_csv, None);
        assert!(config.output.quiet);
    }

    #[test]
    fn malformed_document_is_parse_error() {
        assert!(matches!(
            Config::parse("[run]\ncount = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            Config::load(Path::new("/nonexistent/connscope.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
