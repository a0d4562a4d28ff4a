use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDateTime};
use notelock_core::{error::NoteError, notes::NoteName};
use tempfile::NamedTempFile;
use tracing::{debug, instrument, warn};

use crate::{
    codec::{self, EncryptedNoteFile},
    key_custodian::{KeyCustodian, KeyStore},
    locks::FileLocks,
};

/// `yyyyMMdd_HHmmss`, the timestamp embedded in note file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Source of the wall-clock time used to name notes.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Directory of encrypted notes, one file per note, named by save time.
///
/// Names have second resolution: a second save within the same second
/// replaces the first note.
pub struct NoteStore<S: KeyStore, C: Clock = SystemClock> {
    root: PathBuf,
    custodian: KeyCustodian<S>,
    clock: C,
    locks: FileLocks,
}

impl<S: KeyStore> NoteStore<S, SystemClock> {
    pub fn new(root: impl Into<PathBuf>, custodian: KeyCustodian<S>) -> Self {
        Self {
            root: root.into(),
            custodian,
            clock: SystemClock,
            locks: FileLocks::default(),
        }
    }
}

impl<S: KeyStore, C: Clock> NoteStore<S, C> {
    pub fn with_clock<C2: Clock>(self, clock: C2) -> NoteStore<S, C2> {
        NoteStore {
            root: self.root,
            custodian: self.custodian,
            clock,
            locks: self.locks,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn custodian(&self) -> &KeyCustodian<S> {
        &self.custodian
    }

    pub fn path_for(&self, name: &NoteName) -> PathBuf {
        self.root.join(name.as_str())
    }

    #[instrument(skip_all, fields(note = tracing::field::Empty))]
    pub fn save(&self, plaintext: &[u8]) -> Result<NoteName, NoteError> {
        let stamp = self.clock.now().format(TIMESTAMP_FORMAT).to_string();
        let name = NoteName::from_timestamp(&stamp);
        tracing::Span::current().record("note", name.as_str());

        let _guard = self.locks.acquire(name.as_str());
        let key = self.custodian.get_or_create_master_key()?;
        let file = codec::encrypt(plaintext, &key)?;

        let path = self.path_for(&name);
        if path.exists() {
            warn!("a note was already saved this second; overwriting it");
        }
        write_atomic(&path, file.as_bytes())?;
        debug!(bytes = file.as_bytes().len(), "note written");
        Ok(name)
    }

    /// Note names in ascending (chronological) order.
    pub fn list(&self) -> Result<Vec<NoteName>, NoteError> {
        list_matching(&self.root, NoteName::parse)
    }

    #[instrument(skip_all, fields(note = %name))]
    pub fn load(&self, name: &NoteName) -> Result<Vec<u8>, NoteError> {
        let _guard = self.locks.acquire(name.as_str());
        let file = self.read_file(name)?;
        let key = self.custodian.get_or_create_master_key()?;
        codec::decrypt(&file, &key)
    }

    /// The note's on-disk bytes, returned only after every segment authenticates.
    #[instrument(skip_all, fields(note = %name))]
    pub fn read_verified(&self, name: &NoteName) -> Result<EncryptedNoteFile, NoteError> {
        let _guard = self.locks.acquire(name.as_str());
        let file = self.read_file(name)?;
        let key = self.custodian.get_or_create_master_key()?;
        codec::verify(&file, &key)?;
        Ok(file)
    }

    #[instrument(skip_all, fields(note = %name))]
    pub fn delete(&self, name: &NoteName) -> Result<(), NoteError> {
        let _guard = self.locks.acquire(name.as_str());
        fs::remove_file(self.path_for(name)).map_err(|err| NoteError::from_io(err, name.as_str()))
    }

    fn read_file(&self, name: &NoteName) -> Result<EncryptedNoteFile, NoteError> {
        fs::read(self.path_for(name))
            .map(EncryptedNoteFile::from_bytes)
            .map_err(|err| NoteError::from_io(err, name.as_str()))
    }
}

/// Write via a temp file in the same directory so readers never see a partial file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), NoteError> {
    let parent = path
        .parent()
        .ok_or_else(|| NoteError::io("invalid storage path"))?;
    fs::create_dir_all(parent).map_err(NoteError::io)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(NoteError::io)?;
    tmp.write_all(bytes).map_err(NoteError::io)?;
    tmp.flush().map_err(NoteError::io)?;
    tmp.persist(path).map_err(|e| NoteError::io(e.error))?;
    Ok(())
}

/// Sorted names of the regular files in `dir` that `parse` accepts.
pub(crate) fn list_matching<T: Ord>(
    dir: &Path,
    parse: impl Fn(&str) -> Result<T, NoteError>,
) -> Result<Vec<T>, NoteError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(NoteError::io(err)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(NoteError::io)?;
        if !entry.file_type().map_err(NoteError::io)?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if let Ok(parsed) = parse(name) {
                names.push(parsed);
            }
        }
    }
    names.sort();
    Ok(names)
}
