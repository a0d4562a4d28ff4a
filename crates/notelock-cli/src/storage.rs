use std::{path::PathBuf, sync::Arc};

use crate::config::Config;
use color_eyre::Result;
use dirs::{cache_dir, data_dir};
use notelock_core::auth::AuthWindow;
use notelock_storage::{
    exchange::Exchange,
    key_custodian::{KeyCustodian, KeyringStore, DEFAULT_KEY_ALIAS},
    note_store::NoteStore,
    vault::FileVault,
};
use tracing::debug;

pub const KEYRING_SERVICE: &str = "notelock";

/// Resolve the default directory for protected notes.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("notelock").join("notes"))
}

/// Resolve the default exchange directory (cache, outside the protected store).
pub fn default_exchange_dir() -> Result<PathBuf> {
    let base = cache_dir().ok_or_else(|| color_eyre::eyre::eyre!("no cache dir available"))?;
    Ok(base.join("notelock"))
}

/// Build the keychain-backed vault, honouring config overrides.
/// `window` must be the one the authorization gate stamps.
pub fn vault_from_config(
    config: &Config,
    window: Arc<AuthWindow>,
) -> Result<FileVault<KeyringStore>> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    let exchange = match &config.exchange_dir {
        Some(dir) => dir.clone(),
        None => default_exchange_dir()?,
    };
    debug!(?root, ?exchange, "initializing encrypted note store");

    let service = config
        .keyring_service
        .clone()
        .unwrap_or_else(|| KEYRING_SERVICE.to_string());
    let alias = config
        .key_alias
        .clone()
        .unwrap_or_else(|| DEFAULT_KEY_ALIAS.to_string());
    let custodian = KeyCustodian::new(KeyringStore::new(service), window)
        .with_alias(alias)
        .with_policy(config.key_policy());

    Ok(FileVault::new(
        NoteStore::new(root, custodian),
        Exchange::new(exchange),
    ))
}

/// Helper for tests: a vault under `root` with an in-memory key.
#[cfg(test)]
pub fn test_vault(
    root: &std::path::Path,
    window: Arc<AuthWindow>,
) -> FileVault<notelock_storage::key_custodian::InMemoryKeyStore> {
    use notelock_storage::key_custodian::InMemoryKeyStore;

    FileVault::new(
        NoteStore::new(
            root.join("notes"),
            KeyCustodian::new(InMemoryKeyStore::default(), window),
        ),
        Exchange::new(root.join("exchange")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_overrides_directories() {
        let config = Config {
            data_dir: Some(PathBuf::from("/tmp/notelock-notes")),
            exchange_dir: Some(PathBuf::from("/tmp/notelock-exchange")),
            ..Config::default()
        };
        let vault = vault_from_config(&config, Arc::new(AuthWindow::new())).expect("vault");

        assert_eq!(vault.store().root(), PathBuf::from("/tmp/notelock-notes"));
        assert_eq!(vault.exchange().root(), PathBuf::from("/tmp/notelock-exchange"));
    }
}
