use std::{
    collections::BTreeMap,
    fmt,
    str::FromStr,
    sync::{Arc, Mutex},
};

use crate::error::NoteError;

pub const NOTE_PREFIX: &str = "note_";
pub const NOTE_SUFFIX: &str = ".txt";
pub const EXPORT_PREFIX: &str = "exported_";

/// File name identifying a note at rest: `note_<yyyyMMdd_HHmmss>.txt`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NoteName(String);

impl NoteName {
    /// Accepts any plain file name of the form `note_*.txt`.
    pub fn parse(name: &str) -> Result<Self, NoteError> {
        if has_shape(name, NOTE_PREFIX, NOTE_SUFFIX) {
            Ok(Self(name.to_string()))
        } else {
            Err(NoteError::InvalidName {
                name: name.to_string(),
            })
        }
    }

    /// Build a name from a `yyyyMMdd_HHmmss` stamp.
    pub fn from_timestamp(stamp: &str) -> Self {
        Self(format!("{NOTE_PREFIX}{stamp}{NOTE_SUFFIX}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of this note's copy in the exchange area.
    pub fn export_name(&self) -> ExportName {
        ExportName(format!("{EXPORT_PREFIX}{}", self.0))
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NoteName {
    type Err = NoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// File name of an exported copy: `exported_<original name>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExportName(String);

impl ExportName {
    pub fn parse(name: &str) -> Result<Self, NoteError> {
        if has_shape(name, EXPORT_PREFIX, NOTE_SUFFIX) {
            Ok(Self(name.to_string()))
        } else {
            Err(NoteError::InvalidName {
                name: name.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExportName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ExportName {
    type Err = NoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// Plain file name only: nothing that could resolve outside its directory.
fn has_shape(name: &str, prefix: &str, suffix: &str) -> bool {
    name.len() > prefix.len() + suffix.len()
        && name.starts_with(prefix)
        && name.ends_with(suffix)
        && !name.contains(['/', '\\', '\0'])
        && !name.contains("..")
}

/// Everything the action surface needs from the protected store and the exchange area.
pub trait NoteVault: Send + Sync {
    /// Encrypt and persist a new note, returning its name.
    fn save(&self, plaintext: &[u8]) -> Result<NoteName, NoteError>;

    /// Note names in ascending order; empty when none exist.
    fn list(&self) -> Result<Vec<NoteName>, NoteError>;

    /// Decrypt and return a note's plaintext.
    fn load(&self, name: &NoteName) -> Result<Vec<u8>, NoteError>;

    fn delete(&self, name: &NoteName) -> Result<(), NoteError>;

    /// Copy a note's verified ciphertext into the exchange area.
    fn export(&self, name: &NoteName) -> Result<ExportName, NoteError>;

    fn list_exports(&self) -> Result<Vec<ExportName>, NoteError>;

    /// Raw bytes of an exchange-area file.
    fn import(&self, name: &ExportName) -> Result<Vec<u8>, NoteError>;
}

impl<V: NoteVault + ?Sized> NoteVault for Arc<V> {
    fn save(&self, plaintext: &[u8]) -> Result<NoteName, NoteError> {
        (**self).save(plaintext)
    }

    fn list(&self) -> Result<Vec<NoteName>, NoteError> {
        (**self).list()
    }

    fn load(&self, name: &NoteName) -> Result<Vec<u8>, NoteError> {
        (**self).load(name)
    }

    fn delete(&self, name: &NoteName) -> Result<(), NoteError> {
        (**self).delete(name)
    }

    fn export(&self, name: &NoteName) -> Result<ExportName, NoteError> {
        (**self).export(name)
    }

    fn list_exports(&self) -> Result<Vec<ExportName>, NoteError> {
        (**self).list_exports()
    }

    fn import(&self, name: &ExportName) -> Result<Vec<u8>, NoteError> {
        (**self).import(name)
    }
}

/// In-memory vault for tests and smoke runs.
/// Notes are XOR-masked, not encrypted; never use this outside tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryVault {
    inner: Arc<Mutex<VaultState>>,
}

#[derive(Debug, Default)]
struct VaultState {
    next: u32,
    notes: BTreeMap<NoteName, Vec<u8>>,
    exports: BTreeMap<ExportName, Vec<u8>>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, VaultState>, NoteError> {
        self.inner
            .lock()
            .map_err(|err| NoteError::io(format!("lock poisoned: {err}")))
    }
}

impl NoteVault for InMemoryVault {
    fn save(&self, plaintext: &[u8]) -> Result<NoteName, NoteError> {
        let mut state = self.state()?;
        state.next += 1;
        let name = NoteName::from_timestamp(&format!("19700101_{:06}", state.next));
        state.notes.insert(name.clone(), mask(plaintext));
        Ok(name)
    }

    fn list(&self) -> Result<Vec<NoteName>, NoteError> {
        Ok(self.state()?.notes.keys().cloned().collect())
    }

    fn load(&self, name: &NoteName) -> Result<Vec<u8>, NoteError> {
        let state = self.state()?;
        let masked = state.notes.get(name).ok_or_else(|| NoteError::NotFound {
            name: name.to_string(),
        })?;
        Ok(mask(masked))
    }

    fn delete(&self, name: &NoteName) -> Result<(), NoteError> {
        self.state()?
            .notes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| NoteError::NotFound {
                name: name.to_string(),
            })
    }

    fn export(&self, name: &NoteName) -> Result<ExportName, NoteError> {
        let mut state = self.state()?;
        let masked = state
            .notes
            .get(name)
            .cloned()
            .ok_or_else(|| NoteError::NotFound {
                name: name.to_string(),
            })?;
        let export = name.export_name();
        state.exports.insert(export.clone(), masked);
        Ok(export)
    }

    fn list_exports(&self) -> Result<Vec<ExportName>, NoteError> {
        Ok(self.state()?.exports.keys().cloned().collect())
    }

    fn import(&self, name: &ExportName) -> Result<Vec<u8>, NoteError> {
        self.state()?
            .exports
            .get(name)
            .cloned()
            .ok_or_else(|| NoteError::NotFound {
                name: name.to_string(),
            })
    }
}

const MASK_BYTE: u8 = 0xA5;

fn mask(input: &[u8]) -> Vec<u8> {
    input.iter().map(|b| b ^ MASK_BYTE).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timestamped_note_names() {
        let name = NoteName::parse("note_20240131_235959.txt").expect("valid name");
        assert_eq!(name, NoteName::from_timestamp("20240131_235959"));
        assert_eq!(
            name.export_name().as_str(),
            "exported_note_20240131_235959.txt"
        );
    }

    #[test]
    fn rejects_names_outside_the_convention() {
        for bad in [
            "note_.txt",
            "notes.txt",
            "note_1.md",
            "note_../../etc/passwd.txt",
            "note_a/b.txt",
            "exported_note_1.txt",
        ] {
            assert!(
                matches!(NoteName::parse(bad), Err(NoteError::InvalidName { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn export_names_round_trip_through_parse() {
        let export = NoteName::from_timestamp("20240101_000000").export_name();
        assert_eq!(ExportName::parse(export.as_str()).expect("valid"), export);
        assert!(ExportName::parse("note_20240101_000000.txt").is_err());
    }

    #[test]
    fn in_memory_vault_masks_and_deletes() {
        let vault = InMemoryVault::new();
        let name = vault.save(b"top-secret").expect("save");
        assert_eq!(vault.load(&name).expect("load"), b"top-secret");
        {
            let state = vault.inner.lock().expect("lock");
            assert_ne!(state.notes.get(&name).expect("stored"), b"top-secret");
        }

        vault.delete(&name).expect("delete");
        let err = vault.delete(&name).expect_err("second delete");
        assert!(matches!(err, NoteError::NotFound { .. }));
        assert!(vault.list().expect("list").is_empty());
    }
}
