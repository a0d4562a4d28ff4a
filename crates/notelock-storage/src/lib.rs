//! Encryption at rest for Notelock: the master-key custodian, the
//! AES-256-GCM-HKDF-4KB note codec, the note directory and its exchange area.

pub mod codec;
pub mod exchange;
pub mod key_custodian;
mod locks;
pub mod note_store;
pub mod vault;
