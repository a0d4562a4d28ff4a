use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use color_eyre::{eyre::eyre, Result};
use dirs::config_dir;
use notelock_core::auth::{AuthenticatorClasses, PromptConfig};
use notelock_storage::key_custodian::KeyPolicy;
use serde::{Deserialize, Serialize};

/// User-level configuration loaded from `~/.config/notelock/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the protected notes directory.
    pub data_dir: Option<PathBuf>,
    /// Override for the unprotected exchange directory.
    pub exchange_dir: Option<PathBuf>,
    /// Keychain service the master key is stored under.
    pub keyring_service: Option<String>,
    /// Keychain entry name of the master key.
    pub key_alias: Option<String>,
    /// Seconds a successful authentication keeps the key usable (new keys only).
    pub auth_validity_secs: Option<u64>,
    pub prompt: Option<PromptSettings>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PromptSettings {
    pub title: Option<String>,
    pub subtitle: Option<String>,
}

impl Config {
    pub fn prompt_config(&self) -> PromptConfig {
        let mut prompt = PromptConfig::default();
        if let Some(settings) = &self.prompt {
            if let Some(title) = &settings.title {
                prompt.title = title.clone();
            }
            if let Some(subtitle) = &settings.subtitle {
                prompt.subtitle = subtitle.clone();
            }
        }
        prompt
    }

    pub fn key_policy(&self) -> KeyPolicy {
        let validity = self
            .auth_validity_secs
            .map(Duration::from_secs)
            .unwrap_or(KeyPolicy::DEFAULT_VALIDITY);
        KeyPolicy::default().require_user_authentication(validity, AuthenticatorClasses::OWNER_PRESENT)
    }
}

/// Read `path`, falling back to defaults when the file is absent or blank.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    match fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => Ok(Config::default()),
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
        Err(err) => Err(err.into()),
    }
}

/// `<config dir>/notelock/config.toml`.
pub fn default_path() -> Result<PathBuf> {
    config_dir()
        .map(|dir| dir.join("notelock").join("config.toml"))
        .ok_or_else(|| eyre!("no config dir available"))
}

/// Write the given config to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_to_path_if_missing(config, &default_path()?)
}

/// Never clobbers an existing file, to preserve user edits.
pub fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_default_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_from_path(dir.path().join("config.toml")).expect("load");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.prompt_config(), PromptConfig::default());
        assert_eq!(cfg.key_policy(), KeyPolicy::default());
    }

    #[test]
    fn blank_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "  \n").expect("write blank config");

        assert_eq!(load_from_path(&path).expect("load"), Config::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "auth_validity_secs = \"soon\"").expect("write config");

        assert!(load_from_path(&path).is_err());
    }

    #[test]
    fn parses_custom_config() {
        let contents = r#"
            data_dir = "/tmp/notelock-data"
            exchange_dir = "/tmp/notelock-cache"
            keyring_service = "notelock-dev"
            key_alias = "dev_key"
            auth_validity_secs = 30
            [prompt]
            title = "Unlock notes"
        "#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).expect("write temp config");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(
            cfg,
            Config {
                data_dir: Some(PathBuf::from("/tmp/notelock-data")),
                exchange_dir: Some(PathBuf::from("/tmp/notelock-cache")),
                keyring_service: Some("notelock-dev".into()),
                key_alias: Some("dev_key".into()),
                auth_validity_secs: Some(30),
                prompt: Some(PromptSettings {
                    title: Some("Unlock notes".into()),
                    subtitle: None,
                }),
            }
        );

        let prompt = cfg.prompt_config();
        assert_eq!(prompt.title, "Unlock notes");
        assert_eq!(prompt.subtitle, PromptConfig::default().subtitle);
        assert_eq!(cfg.key_policy().validity(), Duration::from_secs(30));
    }

    #[test]
    fn write_creates_file_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            data_dir: Some(PathBuf::from("/tmp/notelock-data")),
            ..Config::default()
        };

        write_to_path_if_missing(&cfg, &path).expect("write should succeed");
        let other = Config {
            key_alias: Some("ignored".into()),
            ..Config::default()
        };
        let second = write_to_path_if_missing(&other, &path).expect("second write ok");
        assert_eq!(second, path);
        assert_eq!(load_from_path(&path).expect("load"), cfg);
    }
}
