use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use base64::{engine::general_purpose, Engine as _};
use notelock_core::{
    auth::{AuthWindow, AuthenticatorClasses},
    error::NoteError,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};
use zeroize::{Zeroize, Zeroizing};

/// Alias the master key is stored under.
pub const DEFAULT_KEY_ALIAS: &str = "_notelock_master_key";

/// Master key size in bytes (256-bit).
pub const KEY_SIZE: usize = 32;

/// Raw 256-bit key material. Zeroized on drop, never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyBytes([u8; KEY_SIZE]);

impl KeyBytes {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl Drop for KeyBytes {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyBytes([REDACTED])")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BlockMode {
    Gcm,
    Cbc,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Padding {
    None,
    Pkcs7,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Purposes {
    pub encrypt: bool,
    pub decrypt: bool,
}

/// How recently the owner must have authenticated for the key to be usable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAuthentication {
    pub validity: Duration,
    pub allowed: AuthenticatorClasses,
}

/// Generation parameters for the master key. Travels with the key once stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyPolicy {
    pub purposes: Purposes,
    pub block_mode: BlockMode,
    pub padding: Padding,
    pub key_bits: u16,
    pub user_auth: UserAuthentication,
    pub invalidated_by_enrollment: bool,
}

impl KeyPolicy {
    /// Shortest practical re-authentication window.
    pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(10);

    /// Require an authentication no older than `validity` from one of `allowed`.
    ///
    /// Covers both ways platforms phrase this (a bare duration, or a duration
    /// plus credential classes); callers never need to care which.
    pub fn require_user_authentication(
        mut self,
        validity: Duration,
        allowed: AuthenticatorClasses,
    ) -> Self {
        self.user_auth = UserAuthentication { validity, allowed };
        self
    }

    pub fn validity(&self) -> Duration {
        self.user_auth.validity
    }

    /// Reject parameters the note codec cannot work with.
    pub fn validate(&self) -> Result<(), NoteError> {
        let reason = if !(self.purposes.encrypt && self.purposes.decrypt) {
            "key must allow both encrypt and decrypt".to_string()
        } else if self.block_mode != BlockMode::Gcm {
            format!("unsupported block mode {:?}", self.block_mode)
        } else if self.padding != Padding::None {
            format!("unsupported padding {:?}", self.padding)
        } else if usize::from(self.key_bits) != KEY_SIZE * 8 {
            format!("unsupported key size {} bits", self.key_bits)
        } else if self.user_auth.validity.is_zero() {
            "authentication validity window must be non-zero".to_string()
        } else if self.user_auth.allowed.is_empty() {
            "at least one authenticator class must be allowed".to_string()
        } else {
            return Ok(());
        };
        Err(NoteError::KeyGeneration { reason })
    }
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            purposes: Purposes {
                encrypt: true,
                decrypt: true,
            },
            block_mode: BlockMode::Gcm,
            padding: Padding::None,
            key_bits: 256,
            user_auth: UserAuthentication {
                validity: Self::DEFAULT_VALIDITY,
                allowed: AuthenticatorClasses::OWNER_PRESENT,
            },
            invalidated_by_enrollment: false,
        }
    }
}

/// A key as persisted by a `KeyStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredKey {
    pub material: KeyBytes,
    pub policy: KeyPolicy,
}

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Protected key facility (OS keychain in production; memory in tests).
pub trait KeyStore: Send + Sync {
    fn get(&self, alias: &str) -> Result<Option<StoredKey>, KeyStoreError>;
    fn put(&self, alias: &str, key: &StoredKey) -> Result<(), KeyStoreError>;
}

/// OS keyring-backed key store. One entry per alias under a fixed service name.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, alias: &str) -> Result<keyring::Entry, KeyStoreError> {
        keyring::Entry::new(&self.service, alias).map_err(|e| KeyStoreError::Keyring(e.to_string()))
    }
}

impl KeyStore for KeyringStore {
    fn get(&self, alias: &str) -> Result<Option<StoredKey>, KeyStoreError> {
        match self.entry(alias)?.get_password() {
            Ok(secret) => decode_record(&Zeroizing::new(secret)).map(Some),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(KeyStoreError::Keyring(err.to_string())),
        }
    }

    fn put(&self, alias: &str, key: &StoredKey) -> Result<(), KeyStoreError> {
        self.entry(alias)?
            .set_password(&encode_record(key)?)
            .map_err(|e| KeyStoreError::Keyring(e.to_string()))
    }
}

/// In-memory key store for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyStore {
    inner: Arc<Mutex<HashMap<String, StoredKey>>>,
}

impl KeyStore for InMemoryKeyStore {
    fn get(&self, alias: &str) -> Result<Option<StoredKey>, KeyStoreError> {
        let guard = self
            .inner
            .lock()
            .map_err(|err| KeyStoreError::Keyring(format!("lock poisoned: {err}")))?;
        Ok(guard.get(alias).cloned())
    }

    fn put(&self, alias: &str, key: &StoredKey) -> Result<(), KeyStoreError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyStoreError::Keyring(format!("lock poisoned: {err}")))?;
        guard.insert(alias.to_string(), key.clone());
        Ok(())
    }
}

impl<K: KeyStore + ?Sized> KeyStore for Arc<K> {
    fn get(&self, alias: &str) -> Result<Option<StoredKey>, KeyStoreError> {
        (**self).get(alias)
    }

    fn put(&self, alias: &str, key: &StoredKey) -> Result<(), KeyStoreError> {
        (**self).put(alias, key)
    }
}

/// Handle to the master key. Key bytes are only reachable inside this crate,
/// and only while the owner's last authentication is within the key's window.
#[derive(Clone)]
pub struct MasterKeyHandle {
    alias: String,
    material: Arc<KeyBytes>,
    policy: KeyPolicy,
    window: Arc<AuthWindow>,
}

impl MasterKeyHandle {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn policy(&self) -> &KeyPolicy {
        &self.policy
    }

    /// Whether a cryptographic operation would currently be allowed.
    pub fn is_usable(&self) -> bool {
        self.window.is_fresh(self.policy.validity())
    }

    pub(crate) fn unlock(&self) -> Result<&[u8; KEY_SIZE], NoteError> {
        if self.is_usable() {
            Ok(&self.material.0)
        } else {
            debug!(alias = %self.alias, "master key used outside its authentication window");
            Err(NoteError::KeyUnavailable)
        }
    }
}

impl fmt::Debug for MasterKeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKeyHandle")
            .field("alias", &self.alias)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Owns creation and retrieval of the single master key.
pub struct KeyCustodian<S: KeyStore> {
    store: S,
    alias: String,
    policy: KeyPolicy,
    window: Arc<AuthWindow>,
    creating: Mutex<()>,
}

impl<S: KeyStore> KeyCustodian<S> {
    pub fn new(store: S, window: Arc<AuthWindow>) -> Self {
        Self {
            store,
            alias: DEFAULT_KEY_ALIAS.to_string(),
            policy: KeyPolicy::default(),
            window,
            creating: Mutex::new(()),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Policy applied when the key is first generated.
    pub fn with_policy(mut self, policy: KeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn window(&self) -> &Arc<AuthWindow> {
        &self.window
    }

    /// Return the key stored under the alias, generating it on first use.
    ///
    /// Creation is serialised within this custodian. Two processes creating
    /// the first key at once still race in the key store.
    #[instrument(skip_all, fields(alias = %self.alias))]
    pub fn get_or_create_master_key(&self) -> Result<MasterKeyHandle, NoteError> {
        if let Some(stored) = self.stored()? {
            return Ok(self.handle(stored));
        }

        let _creating = self.creating.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(stored) = self.stored()? {
            return Ok(self.handle(stored));
        }
        self.policy.validate()?;
        let stored = StoredKey {
            material: KeyBytes::generate(),
            policy: self.policy,
        };
        self.store
            .put(&self.alias, &stored)
            .map_err(generation_err)?;
        info!(
            validity_secs = self.policy.validity().as_secs_f32(),
            "generated master key"
        );
        Ok(self.handle(stored))
    }

    fn stored(&self) -> Result<Option<StoredKey>, NoteError> {
        self.store.get(&self.alias).map_err(generation_err)
    }

    fn handle(&self, stored: StoredKey) -> MasterKeyHandle {
        MasterKeyHandle {
            alias: self.alias.clone(),
            policy: stored.policy,
            material: Arc::new(stored.material),
            window: Arc::clone(&self.window),
        }
    }
}

fn generation_err(err: KeyStoreError) -> NoteError {
    NoteError::KeyGeneration {
        reason: err.to_string(),
    }
}

/// Keychain entry body. The base64 key is wiped when the record drops.
#[derive(Serialize, Deserialize)]
struct KeyRecord {
    key: String,
    policy: KeyPolicy,
}

impl Drop for KeyRecord {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

fn encode_record(key: &StoredKey) -> Result<Zeroizing<String>, KeyStoreError> {
    let record = KeyRecord {
        key: general_purpose::STANDARD.encode(key.material.0),
        policy: key.policy,
    };
    serde_json::to_string(&record)
        .map(Zeroizing::new)
        .map_err(|e| KeyStoreError::Decode(e.to_string()))
}

fn decode_record(secret: &str) -> Result<StoredKey, KeyStoreError> {
    let record: KeyRecord =
        serde_json::from_str(secret).map_err(|e| KeyStoreError::Decode(e.to_string()))?;
    let mut bytes = general_purpose::STANDARD
        .decode(&record.key)
        .map_err(|e| KeyStoreError::Decode(e.to_string()))?;

    if bytes.len() != KEY_SIZE {
        let len = bytes.len();
        bytes.zeroize();
        return Err(KeyStoreError::Decode(format!(
            "expected {KEY_SIZE} bytes, got {len}"
        )));
    }

    let mut out = [0u8; KEY_SIZE];
    out.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(StoredKey {
        material: KeyBytes(out),
        policy: record.policy,
    })
}

/// Handle backed by a fresh random key whose window is already open.
#[cfg(test)]
pub(crate) fn unlocked_test_handle() -> MasterKeyHandle {
    let window = Arc::new(AuthWindow::new());
    window.record();
    KeyCustodian::new(InMemoryKeyStore::default(), window)
        .get_or_create_master_key()
        .expect("in-memory key")
}
