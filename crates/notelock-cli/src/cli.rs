use clap::{Parser, Subcommand};

/// CLI surface. Every command that touches note content asks for authentication first.
#[derive(Parser, Debug)]
#[command(
    name = "notelock",
    about = "Short notes, encrypted at rest, opened only after you authenticate",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to listing notes when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Encrypt and save a new note named after the current time.
    Save {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// List saved notes.
    List,
    /// Decrypt and print a note.
    Load { file: String },
    /// Delete a note.
    Delete { file: String },
    /// Copy a note's ciphertext into the exchange directory.
    Export { file: String },
    /// Read an exchange-directory file back as-is.
    Import { file: String },
    /// List files available for import.
    Exports,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version and exit.
    Version,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_list_when_missing_subcommand() {
        let cli = Cli::try_parse_from(["notelock"]).expect("parse should succeed");
        assert_eq!(cli.command, None);
    }

    #[test]
    fn save_joins_free_text() {
        let cli = Cli::try_parse_from(["notelock", "save", "buy", "milk"]).expect("parse");
        assert_eq!(
            cli.command,
            Some(Command::Save {
                text: vec!["buy".into(), "milk".into()]
            })
        );
    }

    #[test]
    fn save_requires_text() {
        assert!(Cli::try_parse_from(["notelock", "save"]).is_err());
    }

    #[test]
    fn parses_file_commands() {
        let cli = Cli::try_parse_from(["notelock", "load", "note_20240101_000000.txt"])
            .expect("parse");
        assert_eq!(
            cli.command,
            Some(Command::Load {
                file: "note_20240101_000000.txt".into()
            })
        );

        let cli = Cli::try_parse_from(["notelock", "import", "exported_note_1.txt"]).expect("parse");
        assert_eq!(
            cli.command,
            Some(Command::Import {
                file: "exported_note_1.txt".into()
            })
        );
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli =
            Cli::try_parse_from(["notelock", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Config(ConfigCommand::Init)));
    }
}
