use std::{fmt, sync::Arc};

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    auth::Authenticator,
    error::NoteError,
    gate::{AuthorizationGate, GateError},
    notes::{ExportName, NoteName, NoteVault},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Save,
    Load,
    Delete,
    Export,
    Import,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActionKind::Save => "saving",
            ActionKind::Load => "loading",
            ActionKind::Delete => "deleting",
            ActionKind::Export => "exporting",
            ActionKind::Import => "importing",
        })
    }
}

/// A user-visible failure of a gated action. `Display` is the notification text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error("Error {action} note: {source}")]
    Note {
        action: ActionKind,
        #[source]
        source: NoteError,
    },
}

/// The operations a front end offers, each routed through the authorization gate.
pub struct NoteActions<V, A: Authenticator> {
    vault: Arc<V>,
    gate: AuthorizationGate<A>,
}

impl<V, A> NoteActions<V, A>
where
    V: NoteVault + 'static,
    A: Authenticator,
{
    pub fn new(vault: Arc<V>, gate: AuthorizationGate<A>) -> Self {
        Self { vault, gate }
    }

    pub fn gate(&self) -> &AuthorizationGate<A> {
        &self.gate
    }

    /// Note names for selection. Listing reveals no content and is not gated.
    pub fn notes(&self) -> Result<Vec<NoteName>, NoteError> {
        self.vault.list()
    }

    pub fn exports(&self) -> Result<Vec<ExportName>, NoteError> {
        self.vault.list_exports()
    }

    pub async fn request_save(&self, text: impl Into<String>) -> Result<NoteName, ActionError> {
        let text = text.into();
        let name = self
            .run(ActionKind::Save, move |vault| vault.save(text.as_bytes()))
            .await?;
        info!(note = %name, "note saved");
        Ok(name)
    }

    pub async fn request_load(&self, name: NoteName) -> Result<String, ActionError> {
        let bytes = self
            .run(ActionKind::Load, move |vault| vault.load(&name))
            .await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn request_delete(&self, name: NoteName) -> Result<(), ActionError> {
        self.run(ActionKind::Delete, move |vault| vault.delete(&name))
            .await
    }

    pub async fn request_export(&self, name: NoteName) -> Result<ExportName, ActionError> {
        self.run(ActionKind::Export, move |vault| vault.export(&name))
            .await
    }

    pub async fn request_import(&self, name: ExportName) -> Result<String, ActionError> {
        let bytes = self
            .run(ActionKind::Import, move |vault| vault.import(&name))
            .await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn run<T, F>(&self, action: ActionKind, op: F) -> Result<T, ActionError>
    where
        F: FnOnce(&V) -> Result<T, NoteError> + Send + 'static,
        T: Send + 'static,
    {
        let vault = Arc::clone(&self.vault);
        self.gate
            .request(move || op(vault.as_ref()))
            .await?
            .map_err(|source| {
                warn!(%action, error = %source, "note action failed");
                ActionError::Note { action, source }
            })
    }
}
