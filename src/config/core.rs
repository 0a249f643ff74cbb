use std::path::Path;

use serde::{Deserialize, Serialize};

use super::database::ShardConfig;

fn default_grid_size() -> usize {
    1024
}

/// Top-level configuration the engine is built from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Length of the weighted placement grid.
    #[serde(default = "default_grid_size")]
    pub grid_size: usize,
    pub shards: Vec<ShardConfig>,
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Load and parse a TOML config file.
    ///
    /// Failures here are not recoverable at startup, so this panics with a
    /// readable message rather than threading an error type through `main`.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .unwrap_or_else(|err| panic!("failed to read config file {}: {}", path.display(), err));
        Self::from_toml_str(&contents)
            .unwrap_or_else(|err| panic!("failed to parse config file {}: {}", path.display(), err))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml = r#"
            grid_size = 100

            [[shards]]
            name = "a"

            [[shards.replicas]]
            address = "http://127.0.0.1:8086"
        "#;
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.grid_size, 100);
        assert_eq!(config.shards.len(), 1);
        assert_eq!(config.shards[0].weight(), 1);
    }

    #[test]
    fn defaults_grid_size_when_absent() {
        let toml = r#"
            [[shards]]
            name = "a"

            [[shards.replicas]]
            address = "http://127.0.0.1:8086"
        "#;
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.grid_size, 1024);
    }

    #[test]
    fn load_parses_a_config_file_from_disk() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            grid_size = 50

            [[shards]]
            name = "a"

            [[shards.replicas]]
            address = "http://127.0.0.1:8086"
            "#
        )
        .unwrap();

        let config = Config::load(file.path());
        assert_eq!(config.grid_size, 50);
        assert_eq!(config.shards.len(), 1);
    }

    #[test]
    #[should_panic(expected = "failed to read config file")]
    fn load_panics_with_a_readable_message_on_missing_file() {
        Config::load("/nonexistent/path/to/shardgrid.toml");
    }

    #[test]
    #[should_panic(expected = "failed to parse config file")]
    fn load_panics_with_a_readable_message_on_malformed_toml() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not valid toml [[[").unwrap();
        Config::load(file.path());
    }
}
