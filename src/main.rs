use anyhow::Result;
use clap::{Parser, Subcommand};
use docs_rag::commands::{
    add_document, ask_question, delete_document, list_documents, search_index, show_status,
    verify_index,
};
use docs_rag::config::{Config, get_base_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docs-rag")]
#[command(about = "Ask questions about your documents with a local retrieval index")]
#[command(version)]
struct Cli {
    /// Base directory for configuration and index (defaults to $DOCS_RAG_HOME or ~/.docs-rag)
    #[arg(long, global = true)]
    home: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Add a plain text document to the index
    Add {
        /// Path to a UTF-8 text file
        path: PathBuf,
        /// Name to index the document under, defaults to the file name
        #[arg(long)]
        name: Option<String>,
        /// Re-index the document if it is already present
        #[arg(long)]
        replace: bool,
    },
    /// Ask a question about the indexed documents
    Ask {
        question: String,
    },
    /// Show the chunks that best match a query
    Search {
        query: String,
        /// Number of chunks to show
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
    },
    /// List all indexed documents
    List,
    /// Delete a document from the index
    Delete {
        /// Document name as shown by `list`
        document: String,
    },
    /// Check that the stored index is internally consistent
    Verify {
        /// Also re-embed every chunk and compare with the stored vectors
        #[arg(long)]
        reembed: bool,
    },
    /// Show configuration, Ollama connectivity and index statistics
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let base_dir = match cli.home {
        Some(home) => home,
        None => get_base_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&Config::load(&base_dir)?)?;
            } else {
                run_interactive_config(&base_dir)?;
            }
        }
        Commands::Add {
            path,
            name,
            replace,
        } => {
            add_document(&Config::load(&base_dir)?, &path, name, replace)?;
        }
        Commands::Ask { question } => {
            ask_question(&Config::load(&base_dir)?, &question)?;
        }
        Commands::Search { query, top_k } => {
            search_index(&Config::load(&base_dir)?, &query, top_k)?;
        }
        Commands::List => {
            list_documents(&Config::load(&base_dir)?)?;
        }
        Commands::Delete { document } => {
            delete_document(&Config::load(&base_dir)?, &document)?;
        }
        Commands::Verify { reembed } => {
            verify_index(&Config::load(&base_dir)?, reembed)?;
        }
        Commands::Status => {
            show_status(&Config::load(&base_dir)?)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["docs-rag", "list"]).expect("list parses");
        assert!(matches!(cli.command, Commands::List));
        assert!(cli.home.is_none());
    }

    #[test]
    fn add_command_with_path() {
        let cli = Cli::try_parse_from(["docs-rag", "add", "notes.txt"]).expect("add parses");
        let Commands::Add {
            path,
            name,
            replace,
        } = cli.command
        else {
            panic!("expected add command");
        };
        assert_eq!(path, PathBuf::from("notes.txt"));
        assert_eq!(name, None);
        assert!(!replace);
    }

    #[test]
    fn add_command_with_name_and_replace() {
        let cli = Cli::try_parse_from([
            "docs-rag",
            "add",
            "notes.txt",
            "--name",
            "Meeting Notes",
            "--replace",
        ])
        .expect("add parses");
        let Commands::Add { name, replace, .. } = cli.command else {
            panic!("expected add command");
        };
        assert_eq!(name, Some("Meeting Notes".to_string()));
        assert!(replace);
    }

    #[test]
    fn search_command_with_top_k() {
        let cli = Cli::try_parse_from(["docs-rag", "search", "ownership", "-k", "3"])
            .expect("search parses");
        let Commands::Search { query, top_k } = cli.command else {
            panic!("expected search command");
        };
        assert_eq!(query, "ownership");
        assert_eq!(top_k, Some(3));
    }

    #[test]
    fn global_home_flag() {
        let cli = Cli::try_parse_from(["docs-rag", "status", "--home", "/tmp/rag"])
            .expect("status parses");
        assert_eq!(cli.home, Some(PathBuf::from("/tmp/rag")));
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn verify_reembed_flag() {
        let cli = Cli::try_parse_from(["docs-rag", "verify", "--reembed"]).expect("verify parses");
        assert!(matches!(cli.command, Commands::Verify { reembed: true }));
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["docs-rag", "config", "--show"]).expect("config parses");
        assert!(matches!(cli.command, Commands::Config { show: true }));
    }

    #[test]
    fn ask_requires_question() {
        let cli = Cli::try_parse_from(["docs-rag", "ask"]);
        assert!(matches!(
            cli.map_err(|e| e.kind()),
            Err(ErrorKind::MissingRequiredArgument)
        ));
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["docs-rag", "invalid"]);
        assert!(matches!(
            cli.map_err(|e| e.kind()),
            Err(ErrorKind::InvalidSubcommand)
        ));
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["docs-rag", "--help"]);
        assert!(matches!(
            cli.map_err(|e| e.kind()),
            Err(ErrorKind::DisplayHelp)
        ));
    }
}
