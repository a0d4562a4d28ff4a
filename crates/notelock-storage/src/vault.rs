use notelock_core::{
    error::NoteError,
    notes::{ExportName, NoteName, NoteVault},
};

use crate::{
    exchange::Exchange,
    key_custodian::KeyStore,
    note_store::{Clock, NoteStore, SystemClock},
};

/// `NoteVault` over an encrypted note directory and its exchange area.
pub struct FileVault<S: KeyStore, C: Clock = SystemClock> {
    store: NoteStore<S, C>,
    exchange: Exchange,
}

impl<S: KeyStore, C: Clock> FileVault<S, C> {
    pub fn new(store: NoteStore<S, C>, exchange: Exchange) -> Self {
        Self { store, exchange }
    }

    pub fn store(&self) -> &NoteStore<S, C> {
        &self.store
    }

    pub fn exchange(&self) -> &Exchange {
        &self.exchange
    }
}

impl<S: KeyStore, C: Clock> NoteVault for FileVault<S, C> {
    fn save(&self, plaintext: &[u8]) -> Result<NoteName, NoteError> {
        self.store.save(plaintext)
    }

    fn list(&self) -> Result<Vec<NoteName>, NoteError> {
        self.store.list()
    }

    fn load(&self, name: &NoteName) -> Result<Vec<u8>, NoteError> {
        self.store.load(name)
    }

    fn delete(&self, name: &NoteName) -> Result<(), NoteError> {
        self.store.delete(name)
    }

    fn export(&self, name: &NoteName) -> Result<ExportName, NoteError> {
        self.exchange
            .export(&self.store, name)
            .map(|copy| copy.name)
    }

    fn list_exports(&self) -> Result<Vec<ExportName>, NoteError> {
        self.exchange.list()
    }

    fn import(&self, name: &ExportName) -> Result<Vec<u8>, NoteError> {
        self.exchange.import(name)
    }
}
