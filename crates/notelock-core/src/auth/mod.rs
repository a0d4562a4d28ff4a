use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod window;

pub use window::AuthWindow;

/// Classes of authenticator the owner may use to satisfy a challenge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthenticatorClasses {
    /// Class 3 ("strong") biometrics.
    pub biometric_strong: bool,
    /// Screen lock PIN, pattern or password.
    pub device_credential: bool,
}

impl AuthenticatorClasses {
    /// Either a strong biometric or the device credential: proof that the owner
    /// is present, not proof of a specific biometric.
    pub const OWNER_PRESENT: Self = Self {
        biometric_strong: true,
        device_credential: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.biometric_strong && !self.device_credential
    }
}

impl Default for AuthenticatorClasses {
    fn default() -> Self {
        Self::OWNER_PRESENT
    }
}

/// What the authenticator shows the owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptConfig {
    pub title: String,
    pub subtitle: String,
    pub allowed: AuthenticatorClasses,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            title: "Authentication required".to_string(),
            subtitle: "Log in using your screen lock PIN, pattern, or password".to_string(),
            allowed: AuthenticatorClasses::OWNER_PRESENT,
        }
    }
}

/// Well-known `AuthOutcome::Error` codes.
pub mod codes {
    pub const HW_UNAVAILABLE: i32 = 1;
    pub const TIMEOUT: i32 = 3;
    pub const LOCKOUT: i32 = 7;
    pub const LOCKOUT_PERMANENT: i32 = 9;
    pub const USER_CANCELED: i32 = 10;
}

/// Result of a single authentication challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Success,
    /// A recognisable but rejected attempt (wrong finger, wrong PIN).
    Failed,
    /// Terminal error: cancellation, lockout, hardware unavailable.
    Error { code: i32, message: String },
}

/// External authentication facility (biometric prompt, console confirmation, test double).
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Short name used for logging.
    fn name(&self) -> &'static str;

    /// Run one challenge and report its outcome once it fully resolves.
    async fn challenge(&self, prompt: &PromptConfig) -> AuthOutcome;
}

/// Authenticator that answers every challenge the same way. Useful for tests and smoke runs.
#[derive(Debug, Clone)]
pub struct FixedAuthenticator {
    outcome: AuthOutcome,
}

impl FixedAuthenticator {
    pub fn new(outcome: AuthOutcome) -> Self {
        Self { outcome }
    }

    pub fn approving() -> Self {
        Self::new(AuthOutcome::Success)
    }
}

#[async_trait]
impl Authenticator for FixedAuthenticator {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn challenge(&self, _prompt: &PromptConfig) -> AuthOutcome {
        self.outcome.clone()
    }
}
