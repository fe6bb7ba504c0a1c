//! # HR Assistant CLI (`hrctl`)
//!
//! Maintains the policy index over the employee manual, runs the HR tools
//! from a shell, and serves them to an external agent loop over HTTP/MCP.
//!
//! ## Usage
//!
//! ```bash
//! hrctl --config ./config/hr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hrctl init` | Create the SQLite database and run schema migrations |
//! | `hrctl index` | Re-index the manual (only changed files unless `--full`) |
//! | `hrctl status` | Manual, index and record file overview |
//! | `hrctl search "<query>"` | Rank manual passages |
//! | `hrctl get <id>` | Print an indexed document and its chunks |
//! | `hrctl embed pending` | Backfill missing or stale embeddings |
//! | `hrctl embed rebuild` | Delete and regenerate all embeddings |
//! | `hrctl tool list` | List the tools offered to the agent |
//! | `hrctl tool call <name>` | Run one tool with `--param key=value` |
//! | `hrctl serve` | Start the HTTP + MCP tool server |
//!
//! ## Examples
//!
//! ```bash
//! hrctl index
//! hrctl search "días de teletrabajo" --mode hybrid
//! hrctl tool call vacation_balance --param employee_id=E001
//! hrctl tool call request_vacation --param employee_id=E001 \
//!     --param start_date=2025-12-15 --param end_date=2025-12-19
//! hrctl serve
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use hr_assistant::ingest::IndexOptions;
use hr_assistant::{
    config, db, embed_cmd, get, ingest, logging, migrate, search, server, status, tool_cmd,
};

/// HR assistant: hybrid retrieval over the employee manual plus HR record
/// tools for an external tool-calling agent.
#[derive(Parser)]
#[command(
    name = "hrctl",
    about = "HR assistant: policy retrieval and HR record tools",
    version,
    long_about = "Indexes the employee manual for keyword, semantic and hybrid retrieval, \
    manages vacation, sick leave and payroll records stored as JSON files, and exposes \
    everything as tools over HTTP and MCP for an external tool-calling agent."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hr.toml")]
    config: PathBuf,

    /// Log at debug level (overrides `RUST_LOG` and `[logging] level`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Index the employee manual.
    ///
    /// Unchanged files are skipped by content hash; files removed from the
    /// manual directory are dropped from the index.
    Index {
        /// Re-chunk and re-embed every file, changed or not.
        #[arg(long)]
        full: bool,

        /// Show counts without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show what is indexed and which record files are present.
    Status,

    /// Search the manual.
    Search {
        query: String,

        /// `keyword`, `semantic` or `hybrid`. Defaults to `[retrieval] default_mode`.
        /// Falls back to keyword when embeddings are disabled.
        #[arg(long)]
        mode: Option<String>,

        /// Maximum number of passages.
        #[arg(long)]
        limit: Option<i64>,

        /// Print the keyword/semantic score breakdown.
        #[arg(long)]
        explain: bool,
    },

    /// Print an indexed document by id.
    Get { id: String },

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// List or call the tools offered to the agent.
    Tool {
        #[command(subcommand)]
        action: ToolAction,
    },

    /// Start the HTTP tool server with the MCP endpoint at `/mcp`.
    ///
    /// The manual is re-indexed if it changed before the server binds.
    Serve,

    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed chunks that are missing or have stale embeddings.
    Pending {
        /// Maximum number of chunks to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Override the batch size from config.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Show counts without performing any embedding.
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete and regenerate all embeddings, e.g. after switching models.
    Rebuild {
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[derive(Subcommand)]
enum ToolAction {
    /// List all tools with whether they write records.
    List,
    /// Call a tool with `key=value` parameters.
    Call {
        name: String,
        /// Values are parsed as JSON when possible, otherwise taken as strings.
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },
}

/// Parse a `key=value` pair for `--param` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    match &cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "hrctl", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Tool {
            action: ToolAction::List,
        } => {
            tool_cmd::list_tools()?;
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging, cli.verbose)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Index { full, dry_run } => {
            ingest::run_index(&cfg, IndexOptions { full, dry_run }).await?;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Search {
            query,
            mode,
            limit,
            explain,
        } => {
            search::run_search(&cfg, &query, mode.as_deref(), limit, explain).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending {
                limit,
                batch_size,
                dry_run,
            } => {
                embed_cmd::run_embed_pending(&cfg, limit, batch_size, dry_run).await?;
            }
            EmbedAction::Rebuild { batch_size } => {
                embed_cmd::run_embed_rebuild(&cfg, batch_size).await?;
            }
        },
        Commands::Tool { action } => match action {
            ToolAction::Call { name, params } => {
                tool_cmd::call_tool(&cfg, &name, params).await?;
            }
            ToolAction::List => unreachable!(),
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_key_val_splits_on_first_equals() {
        assert_eq!(
            parse_key_val("comments=a=b").unwrap(),
            ("comments".to_string(), "a=b".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
    }
}
