use std::{
    fs,
    path::{Path, PathBuf},
};

use notelock_core::{
    error::NoteError,
    notes::{ExportName, NoteName},
};
use tracing::{info, instrument};

use crate::{
    key_custodian::KeyStore,
    note_store::{list_matching, write_atomic, Clock, NoteStore},
};

/// A note's ciphertext placed in the exchange area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedCopy {
    pub name: ExportName,
    pub path: PathBuf,
}

/// Unprotected staging directory for copies moving in and out of the store.
///
/// Exported copies are the note's ciphertext, byte for byte; nothing is
/// re-encrypted and no plaintext is written here. Imports are read back raw.
#[derive(Debug, Clone)]
pub struct Exchange {
    root: PathBuf,
}

impl Exchange {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &ExportName) -> PathBuf {
        self.root.join(name.as_str())
    }

    /// Copy `name`'s authenticated ciphertext to `exported_<name>`.
    #[instrument(skip_all, fields(note = %name))]
    pub fn export<S: KeyStore, C: Clock>(
        &self,
        store: &NoteStore<S, C>,
        name: &NoteName,
    ) -> Result<ExportedCopy, NoteError> {
        let file = store.read_verified(name)?;
        let export = name.export_name();
        let path = self.path_for(&export);
        write_atomic(&path, file.as_bytes())?;
        info!(path = %path.display(), "note exported");
        Ok(ExportedCopy { name: export, path })
    }

    /// Exported copies available for import, sorted.
    pub fn list(&self) -> Result<Vec<ExportName>, NoteError> {
        list_matching(&self.root, ExportName::parse)
    }

    /// Raw bytes of an exchange-area file, returned as-is.
    #[instrument(skip_all, fields(export = %name))]
    pub fn import(&self, name: &ExportName) -> Result<Vec<u8>, NoteError> {
        fs::read(self.path_for(name)).map_err(|err| NoteError::from_io(err, name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note_store::tests::{test_store, FixedClock};

    #[test]
    fn export_copies_ciphertext_byte_for_byte() {
        let notes = tempfile::tempdir().expect("tempdir");
        let cache = tempfile::tempdir().expect("tempdir");
        let store = test_store(notes.path(), FixedClock::at(12, 0, 0));
        let exchange = Exchange::new(cache.path());

        let name = store.save(b"portable").expect("save");
        let copy = exchange.export(&store, &name).expect("export");

        assert_eq!(copy.name.as_str(), "exported_note_20240309_120000.txt");
        assert_eq!(copy.path, cache.path().join(copy.name.as_str()));
        let original = fs::read(store.path_for(&name)).expect("read original");
        let exported = fs::read(&copy.path).expect("read export");
        assert_eq!(exported, original);
        assert!(!exported.windows(8).any(|w| w == b"portable"));
    }

    #[test]
    fn export_of_missing_note_is_not_found() {
        let notes = tempfile::tempdir().expect("tempdir");
        let cache = tempfile::tempdir().expect("tempdir");
        let store = test_store(notes.path(), FixedClock::at(12, 0, 0));
        let exchange = Exchange::new(cache.path());

        let err = exchange
            .export(&store, &NoteName::from_timestamp("20240309_120000"))
            .expect_err("missing");
        assert!(matches!(err, NoteError::NotFound { .. }));
        assert!(exchange.list().expect("list").is_empty());
    }

    #[test]
    fn tampered_note_is_not_exported() {
        let notes = tempfile::tempdir().expect("tempdir");
        let cache = tempfile::tempdir().expect("tempdir");
        let store = test_store(notes.path(), FixedClock::at(12, 0, 0));
        let exchange = Exchange::new(cache.path());
        let name = store.save(b"portable").expect("save");

        let path = store.path_for(&name);
        let mut bytes = fs::read(&path).expect("read");
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        fs::write(&path, bytes).expect("write");

        let err = exchange.export(&store, &name).expect_err("tampered");
        assert_eq!(err, NoteError::AuthenticationTagMismatch);
        assert!(!exchange.path_for(&name.export_name()).exists());
    }

    #[test]
    fn unwritable_exchange_is_io_error() {
        let notes = tempfile::tempdir().expect("tempdir");
        let cache = tempfile::tempdir().expect("tempdir");
        let blocker = cache.path().join("blocker");
        fs::write(&blocker, b"file, not a directory").expect("write");
        let store = test_store(notes.path(), FixedClock::at(12, 0, 0));
        let exchange = Exchange::new(&blocker);
        let name = store.save(b"x").expect("save");

        let err = exchange.export(&store, &name).expect_err("cannot write");
        assert!(matches!(err, NoteError::Io { .. }));
    }

    #[test]
    fn import_returns_raw_bytes() {
        let cache = tempfile::tempdir().expect("tempdir");
        let exchange = Exchange::new(cache.path());
        let export = ExportName::parse("exported_note_20240309_120000.txt").expect("name");
        fs::write(exchange.path_for(&export), b"as entered").expect("write");
        fs::write(cache.path().join("other.bin"), b"ignored").expect("write");

        assert_eq!(exchange.list().expect("list"), vec![export.clone()]);
        assert_eq!(exchange.import(&export).expect("import"), b"as entered");
    }

    #[test]
    fn import_missing_is_not_found() {
        let cache = tempfile::tempdir().expect("tempdir");
        let exchange = Exchange::new(cache.path());
        let export = ExportName::parse("exported_note_1.txt").expect("name");

        let err = exchange.import(&export).expect_err("missing");
        assert_eq!(
            err,
            NoteError::NotFound {
                name: "exported_note_1.txt".into()
            }
        );
    }
}
