mod cli;
mod config;
mod console;
mod storage;

use std::{process::ExitCode, sync::Arc};

use crate::cli::{Command, ConfigCommand};
use clap::Parser;
use color_eyre::Result;
use console::ConsoleAuthenticator;
use notelock_core::{
    actions::NoteActions,
    auth::{AuthWindow, Authenticator},
    gate::AuthorizationGate,
    notes::{ExportName, NoteName, NoteVault},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load_from_path(config::default_path()?)?;
    match cli.command.unwrap_or(Command::List) {
        Command::Version => print_version(),
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        command => {
            let window = Arc::new(AuthWindow::new());
            let vault = Arc::new(storage::vault_from_config(&config, Arc::clone(&window))?);
            let gate = AuthorizationGate::new(ConsoleAuthenticator, config.prompt_config(), window);
            let actions = NoteActions::new(vault, gate);

            // Failures are notifications, not crashes.
            match run(command, &actions).await {
                Ok(message) => println!("{message}"),
                Err(notice) => {
                    eprintln!("{notice}");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_tracing() {
    // Respect user-provided filters, default to info; logs go to stderr so note text on stdout stays clean.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("notelock {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

/// Execute one note command, returning the message to show on success or the
/// notification to show on failure.
async fn run<V, A>(command: Command, actions: &NoteActions<V, A>) -> Result<String, String>
where
    V: NoteVault + 'static,
    A: Authenticator,
{
    match command {
        Command::Save { text } => {
            let name = actions
                .request_save(text.join(" "))
                .await
                .map_err(|e| e.to_string())?;
            Ok(format!("Note saved as {name}"))
        }
        Command::List => {
            let names = actions.notes().map_err(|e| e.to_string())?;
            if names.is_empty() {
                return Ok("No notes found".to_string());
            }
            Ok(join_lines(&names))
        }
        Command::Load { file } => {
            let name = NoteName::parse(&file).map_err(|e| e.to_string())?;
            actions.request_load(name).await.map_err(|e| e.to_string())
        }
        Command::Delete { file } => {
            let name = NoteName::parse(&file).map_err(|e| e.to_string())?;
            actions
                .request_delete(name.clone())
                .await
                .map_err(|e| e.to_string())?;
            Ok(format!("Deleted: {name}"))
        }
        Command::Export { file } => {
            let name = NoteName::parse(&file).map_err(|e| e.to_string())?;
            let export = actions
                .request_export(name)
                .await
                .map_err(|e| e.to_string())?;
            Ok(format!("Note exported as {export}"))
        }
        Command::Import { file } => {
            let name = ExportName::parse(&file).map_err(|e| e.to_string())?;
            actions.request_import(name).await.map_err(|e| e.to_string())
        }
        Command::Exports => {
            let names = actions.exports().map_err(|e| e.to_string())?;
            if names.is_empty() {
                return Ok("No exported notes to import found".to_string());
            }
            Ok(join_lines(&names))
        }
        Command::Config(_) | Command::Version => Err("not a note command".to_string()),
    }
}

fn join_lines<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use notelock_core::auth::{AuthOutcome, FixedAuthenticator, PromptConfig};
    use notelock_storage::{key_custodian::InMemoryKeyStore, vault::FileVault};

    use super::*;

    fn actions(
        root: &std::path::Path,
        outcome: AuthOutcome,
    ) -> NoteActions<FileVault<InMemoryKeyStore>, FixedAuthenticator> {
        let window = Arc::new(AuthWindow::new());
        let vault = Arc::new(storage::test_vault(root, Arc::clone(&window)));
        let gate = AuthorizationGate::new(
            FixedAuthenticator::new(outcome),
            PromptConfig::default(),
            window,
        );
        NoteActions::new(vault, gate)
    }

    #[tokio::test]
    async fn save_list_load_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let actions = actions(dir.path(), AuthOutcome::Success);

        assert_eq!(run(Command::List, &actions).await, Ok("No notes found".into()));

        let saved = run(
            Command::Save {
                text: vec!["hello".into(), "there".into()],
            },
            &actions,
        )
        .await
        .expect("save");
        let file = saved
            .strip_prefix("Note saved as ")
            .expect("notice names the file")
            .to_string();

        assert_eq!(run(Command::List, &actions).await, Ok(file.clone()));
        assert_eq!(
            run(Command::Load { file: file.clone() }, &actions).await,
            Ok("hello there".into())
        );
        assert_eq!(
            run(Command::Delete { file: file.clone() }, &actions).await,
            Ok(format!("Deleted: {file}"))
        );
        assert_eq!(run(Command::List, &actions).await, Ok("No notes found".into()));
    }

    #[tokio::test]
    async fn export_then_list_exports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let actions = actions(dir.path(), AuthOutcome::Success);
        assert_eq!(
            run(Command::Exports, &actions).await,
            Ok("No exported notes to import found".into())
        );

        let name = actions.request_save("x").await.expect("save");
        let notice = run(
            Command::Export {
                file: name.to_string(),
            },
            &actions,
        )
        .await
        .expect("export");
        assert_eq!(notice, format!("Note exported as exported_{name}"));
        assert_eq!(
            run(Command::Exports, &actions).await,
            Ok(format!("exported_{name}"))
        );
    }

    #[tokio::test]
    async fn denied_authentication_is_a_notification() {
        let dir = tempfile::tempdir().expect("tempdir");
        let actions = actions(dir.path(), AuthOutcome::Failed);

        let notice = run(
            Command::Save {
                text: vec!["nope".into()],
            },
            &actions,
        )
        .await
        .expect_err("denied");

        assert_eq!(notice, "Authentication failed");
        assert_eq!(run(Command::List, &actions).await, Ok("No notes found".into()));
    }

    #[tokio::test]
    async fn malformed_names_are_rejected_before_authenticating() {
        let dir = tempfile::tempdir().expect("tempdir");
        let actions = actions(dir.path(), AuthOutcome::Success);

        let notice = run(
            Command::Load {
                file: "../secrets.txt".into(),
            },
            &actions,
        )
        .await
        .expect_err("invalid");
        assert_eq!(notice, "invalid file name: ../secrets.txt");
        assert!(!actions.gate().window().is_fresh(std::time::Duration::from_secs(10)));
    }
}
