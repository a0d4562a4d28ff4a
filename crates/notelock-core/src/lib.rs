//! Core contracts for Notelock: error taxonomy, authenticator interface,
//! note identifiers and the authenticate-then-perform gate.
//! No file or key I/O lives here; see `notelock-storage`.

pub mod actions;
pub mod auth;
pub mod error;
pub mod gate;
pub mod notes;
