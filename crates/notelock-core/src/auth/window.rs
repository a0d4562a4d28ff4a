use std::{
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};

/// Proof of the most recent successful authentication.
///
/// Shared between the authorization gate (which stamps it) and the key
/// facility (which refuses key use once the key's validity window has passed).
#[derive(Debug, Default)]
pub struct AuthWindow {
    last: Mutex<Option<Instant>>,
}

impl AuthWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful authentication at the current instant.
    pub fn record(&self) {
        *self.last() = Some(Instant::now());
    }

    /// Forget any recorded authentication.
    pub fn revoke(&self) {
        *self.last() = None;
    }

    /// Whether an authentication was recorded less than `validity` ago.
    pub fn is_fresh(&self, validity: Duration) -> bool {
        self.last().is_some_and(|at| at.elapsed() < validity)
    }

    fn last(&self) -> MutexGuard<'_, Option<Instant>> {
        // The guarded value is a single `Copy` stamp, so a poisoned lock still holds a whole one.
        self.last.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_without_proof() {
        let window = AuthWindow::new();
        assert!(!window.is_fresh(Duration::from_secs(10)));
    }

    #[test]
    fn record_then_expire() {
        let window = AuthWindow::new();
        window.record();
        assert!(window.is_fresh(Duration::from_secs(10)));
        assert!(!window.is_fresh(Duration::ZERO));

        window.revoke();
        assert!(!window.is_fresh(Duration::from_secs(10)));
    }

    #[test]
    fn poisoned_lock_keeps_recording() {
        let window = std::sync::Arc::new(AuthWindow::new());
        let poisoner = std::sync::Arc::clone(&window);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.last.lock().expect("lock");
            panic!("poison the window");
        })
        .join();
        assert!(window.last.is_poisoned());

        window.record();
        assert!(window.is_fresh(Duration::from_secs(10)));
        window.revoke();
        assert!(!window.is_fresh(Duration::from_secs(10)));
    }
}
