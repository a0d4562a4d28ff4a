use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use notelock_core::auth::{codes, AuthOutcome, Authenticator, PromptConfig};

/// Owner-presence check on the terminal: the prompt is shown on stderr and
/// the owner confirms on stdin.
pub struct ConsoleAuthenticator;

#[async_trait]
impl Authenticator for ConsoleAuthenticator {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn challenge(&self, prompt: &PromptConfig) -> AuthOutcome {
        let prompt = prompt.clone();
        // Stdin reads block; keep them off the runtime threads.
        let answer = tokio::task::spawn_blocking(move || {
            ask(&prompt, &mut io::stdin().lock(), &mut io::stderr())
        })
        .await;
        answer.unwrap_or_else(|err| AuthOutcome::Error {
            code: codes::HW_UNAVAILABLE,
            message: err.to_string(),
        })
    }
}

fn ask(prompt: &PromptConfig, input: &mut impl BufRead, output: &mut impl Write) -> AuthOutcome {
    let shown = writeln!(output, "{}", prompt.title)
        .and_then(|_| writeln!(output, "{}", prompt.subtitle))
        .and_then(|_| write!(output, "Confirm you are the owner [y/N]: "))
        .and_then(|_| output.flush());
    if let Err(err) = shown {
        return AuthOutcome::Error {
            code: codes::HW_UNAVAILABLE,
            message: err.to_string(),
        };
    }

    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) => AuthOutcome::Error {
            code: codes::USER_CANCELED,
            message: "user canceled".to_string(),
        },
        Ok(_) => match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => AuthOutcome::Success,
            _ => AuthOutcome::Failed,
        },
        Err(err) => AuthOutcome::Error {
            code: codes::HW_UNAVAILABLE,
            message: err.to_string(),
        },
    }
}
