use std::path::{Path, PathBuf};

use eyre::OptionExt;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

/// Settings read from `~/.tapread/tapread.toml` and `TAPREAD_*` variables
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub(crate) struct Config {
    /// Reader to use, by name or part of it
    pub(crate) reader: Option<String>,
    /// Key store file, `keys.json` in the config directory when unset
    pub(crate) keys_file: Option<PathBuf>,
    /// Extra dictionaries tried after the stored keys
    pub(crate) dictionary_files: Vec<PathBuf>,
    /// Read only the first FeliCa system
    pub(crate) felica_only_first: bool,
    /// Write scans here instead of stdout
    pub(crate) output: Option<PathBuf>,
}

impl Config {
    /// Defaults, then the TOML file, then the environment
    pub(crate) fn load(file: &Path) -> eyre::Result<Self> {
        Ok(Self::figment(file).merge(Env::prefixed("TAPREAD_")).extract()?)
    }

    fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default())).merge(Toml::file(file))
    }

    /// Key store path, falling back to the config directory
    pub(crate) fn keys_file(&self) -> eyre::Result<PathBuf> {
        match &self.keys_file {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("keys.json")),
        }
    }
}

/// Returns the base config directory for tapread. It also creates the
/// directory if it doesn't exist yet.
pub(crate) fn config_dir() -> eyre::Result<PathBuf> {
    let dir = std::env::home_dir()
        .ok_or_eyre("home directory not found")?
        .join(".tapread");
    if !dir.exists() {
        std::fs::create_dir(&dir)?
    }
    Ok(dir)
}

/// Default location of the config file
pub(crate) fn default_config_file() -> eyre::Result<PathBuf> {
    Ok(config_dir()?.join("tapread.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config: Config = Config::figment(&dir.path().join("absent.toml")).extract().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
reader = "ACR122"
keys_file = "/var/lib/tapread/keys.json"
dictionary_files = ["transit.dic", "extra.keys"]
felica_only_first = true
"#
        )
        .unwrap();

        let config: Config = Config::figment(file.path()).extract().unwrap();
        assert_eq!(config.reader.as_deref(), Some("ACR122"));
        assert_eq!(config.keys_file().unwrap(), PathBuf::from("/var/lib/tapread/keys.json"));
        assert_eq!(config.dictionary_files, vec![PathBuf::from("transit.dic"), PathBuf::from("extra.keys")]);
        assert!(config.felica_only_first);
        assert_eq!(config.output, None);
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = Config {
            reader: Some("PICC".into()),
            felica_only_first: true,
            ..Default::default()
        };
        let text = toml::to_string(&config).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        let loaded: Config = Config::figment(file.path()).extract().unwrap();
        assert_eq!(loaded, config);
    }
}
