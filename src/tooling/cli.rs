//! CLI Tooling
//!
//! Command-line interface over the storage router. Every invocation resumes the
//! persisted session, runs one command and prints its output.

use crate::backup::Backup;
use crate::config::{ConfigLoader, NotesConfig, SaveConfig};
use crate::debounce::SaveDebouncer;
use crate::driver::DriverKind;
use crate::error::StorageError;
use crate::node::{path, Node};
use crate::router::{describe_root, Backends, SelectOptions, StorageRouter};
use crate::session::{FileSessionStore, PresetFolderPicker, SessionState};
use crate::tree::{build_tree, render_outline};
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

/// Notes CLI - Markdown notes over sandbox, local folder or cloud storage
#[derive(Parser, Debug)]
#[command(name = "notes")]
#[command(about = "Markdown notes over sandbox, local folder or cloud storage")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Show the active backend
    Status,
    /// Select the storage backend
    Use {
        #[command(subcommand)]
        backend: BackendArg,
        /// Copy every note from the current backend first
        #[arg(long, global = true)]
        migrate: bool,
        /// Switch even if some notes fail to copy
        #[arg(long, global = true)]
        continue_on_error: bool,
    },
    /// Forget the active backend (notes are kept)
    Disconnect,
    /// List all nodes
    Ls,
    /// Print the folder tree
    Tree,
    /// Print a note
    Cat { id: String },
    /// Create a note
    NewFile {
        id: String,
        #[arg(long, default_value = "")]
        content: String,
        /// Pick a free name ("name 1", "name 2", ...) if the id is taken
        #[arg(long)]
        unique: bool,
    },
    /// Create a folder (and any missing parents)
    NewFolder { id: String },
    /// Overwrite a note's content
    Write { id: String, content: String },
    /// Save standard input into a note as it arrives (debounced)
    Stream { id: String },
    /// Rename a node in place
    Rename { id: String, name: String },
    /// Move a node under another folder (root when omitted)
    Mv { id: String, parent: Option<String> },
    /// Delete a node (folders recursively)
    Rm { id: String },
    /// Write a JSON backup of every note
    Export { file: PathBuf },
    /// Replace all notes with a JSON backup
    Import {
        file: PathBuf,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum BackendArg {
    /// App-private storage
    Sandbox,
    /// A folder on this machine
    Local { path: PathBuf },
    /// The cloud notes folder
    Cloud,
}

impl BackendArg {
    pub fn kind(&self) -> DriverKind {
        match self {
            BackendArg::Sandbox => DriverKind::Sandbox,
            BackendArg::Local { .. } => DriverKind::Local,
            BackendArg::Cloud => DriverKind::Cloud,
        }
    }
}

impl Commands {
    /// Folder the user chose on the command line, answered to the folder picker.
    pub fn picked_folder(&self) -> Option<PathBuf> {
        match self {
            Commands::Use {
                backend: BackendArg::Local { path },
                ..
            } => Some(path.clone()),
            _ => None,
        }
    }
}

impl Cli {
    /// Config logging section with command line overrides applied.
    pub fn logging_overrides(&self, config: &mut NotesConfig) {
        if let Some(ref level) = self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(ref format) = self.log_format {
            config.logging.format = format.clone();
        }
        if let Some(ref output) = self.log_output {
            config.logging.output = output.clone();
        }
        if let Some(ref file) = self.log_file {
            config.logging.file = Some(file.clone());
        }
    }
}

/// CLI context for executing commands
pub struct CliContext {
    router: Arc<StorageRouter>,
    save_quiet: Duration,
}

impl CliContext {
    /// Load configuration from the default sources plus `config_path`.
    pub fn load_config(config_path: Option<&std::path::Path>) -> Result<NotesConfig, StorageError> {
        ConfigLoader::load(config_path)
    }

    pub fn new(config: &NotesConfig, picked: Option<PathBuf>) -> Result<Self, StorageError> {
        let backends = Backends::from_config(config)?;
        let store = FileSessionStore::new(config.session.resolve_path()?);
        let router = StorageRouter::new(
            backends,
            Arc::new(store),
            Arc::new(PresetFolderPicker::new(picked)),
        );
        Ok(Self::from_router(Arc::new(router)).with_save_quiet(config.save.debounce()))
    }

    pub fn from_router(router: Arc<StorageRouter>) -> Self {
        Self {
            router,
            save_quiet: SaveConfig::default().debounce(),
        }
    }

    /// Quiet period before a streamed edit is saved.
    pub fn with_save_quiet(mut self, quiet: Duration) -> Self {
        self.save_quiet = quiet;
        self
    }

    pub fn router(&self) -> &Arc<StorageRouter> {
        &self.router
    }

    /// Execute a command
    pub async fn execute(&self, command: &Commands) -> Result<String, StorageError> {
        let resumed = self.router.resume().await;
        match command {
            Commands::Use { .. } | Commands::Disconnect | Commands::Status => {
                if let Err(ref e) = resumed {
                    warn!(error = %e, "Could not resume the previous session");
                }
            }
            _ => {
                resumed?;
            }
        }

        match command {
            Commands::Status => Ok(self.handle_status()),
            Commands::Use {
                backend,
                migrate,
                continue_on_error,
            } => {
                self.handle_use(
                    backend.kind(),
                    SelectOptions {
                        migrate: *migrate,
                        continue_on_error: *continue_on_error,
                    },
                )
                .await
            }
            Commands::Disconnect => {
                self.router.disconnect()?;
                Ok("Disconnected. Notes were left in place.".to_string())
            }
            Commands::Ls => self.handle_ls().await,
            Commands::Tree => {
                let nodes = self.router.list().await?;
                if nodes.is_empty() {
                    return Ok("No notes yet.".to_string());
                }
                Ok(render_outline(&build_tree(&nodes)))
            }
            Commands::Cat { id } => self.router.read(id).await,
            Commands::NewFile {
                id,
                content,
                unique,
            } => self.handle_new_file(id, content, *unique).await,
            Commands::NewFolder { id } => {
                path::validate_id(id)?;
                let node = Node::from_id(id, crate::node::NodeKind::Folder, None);
                let created = self.router.create(node).await?;
                Ok(format!("Created folder {}", created.id))
            }
            Commands::Write { id, content } => {
                let node = self.router.write(id, content).await?;
                Ok(format!("Saved {} ({} bytes)", node.id, content.len()))
            }
            Commands::Stream { id } => {
                let stdin = tokio::io::BufReader::new(tokio::io::stdin());
                self.stream_into(id, stdin).await
            }
            Commands::Rename { id, name } => {
                let node = self.router.rename(id, name).await?;
                Ok(format!("Renamed {} -> {}", id, node.id))
            }
            Commands::Mv { id, parent } => {
                let node = self.router.move_node(id, parent.as_deref()).await?;
                Ok(format!("Moved {} -> {}", id, node.id))
            }
            Commands::Rm { id } => {
                self.router.remove(id).await?;
                Ok(format!("Removed {}", id))
            }
            Commands::Export { file } => {
                let backup = self.router.export_backup().await?;
                std::fs::write(file, backup.to_json()?)
                    .map_err(|e| StorageError::from_io(e, file.display()))?;
                Ok(format!(
                    "Exported {} nodes to {}",
                    backup.nodes.len(),
                    file.display()
                ))
            }
            Commands::Import { file, yes } => self.handle_import(file, *yes).await,
        }
    }

    fn handle_status(&self) -> String {
        let mut out = format!("{}\n\n", "Storage".bold().underline());
        let state = self.router.state();
        let state_text = match state {
            SessionState::Active(_) => format!("{}", state.to_string().green()),
            SessionState::RequiresReauthorization(_) => format!("{}", state.to_string().yellow()),
            SessionState::Uninitialized => format!("{}", state.to_string().dimmed()),
        };
        out.push_str(&format!("  Session: {}\n", state_text));
        match state.mode() {
            Some(DriverKind::Sandbox) => out.push_str(&format!(
                "  Sandbox: {}\n",
                self.router.backends().sandbox_root().display()
            )),
            Some(DriverKind::Local) => out.push_str(&format!(
                "  Folder: {}\n",
                describe_root(self.router.local_root().as_deref())
            )),
            Some(DriverKind::Cloud) => out.push_str(&format!(
                "  Token cached: {}\n",
                if self.router.backends().tokens().has_token() {
                    "yes"
                } else {
                    "no"
                }
            )),
            None => out.push_str("  Run 'notes use sandbox|local <PATH>|cloud' to pick a backend.\n"),
        }
        if let SessionState::RequiresReauthorization(_) = state {
            out.push_str("  Run 'notes use local <PATH>' to grant folder access again.\n");
        }
        out
    }

    async fn handle_use(
        &self,
        mode: DriverKind,
        options: SelectOptions,
    ) -> Result<String, StorageError> {
        let outcome = self.router.select_backend(mode, options).await?;
        let mut out = String::new();
        if let Some(ref report) = outcome.migration {
            out.push_str(&format!("Copied {} nodes\n", report.copied.len()));
            if !report.failed.is_empty() {
                let mut table = Table::new();
                table.load_preset(UTF8_BORDERS_ONLY);
                table.set_header(vec!["Id", "Error"]);
                for (id, err) in &report.failed {
                    table.add_row(vec![id.clone(), err.to_string()]);
                }
                out.push_str(&format!("{}\n", "Failed to copy".red()));
                out.push_str(&format!("{}\n", table));
            }
        }
        if outcome.switched {
            out.push_str(&format!("Now using {}", outcome.mode));
        } else {
            out.push_str(&format!(
                "Still using {} (rerun with --continue-on-error to switch anyway)",
                self.router
                    .mode()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "nothing".to_string())
            ));
        }
        Ok(out)
    }

    /// Replace note `id` with `input`, saving as lines arrive through a debouncer.
    ///
    /// Pending saves are flushed at end of input.
    pub async fn stream_into<R>(&self, id: &str, input: R) -> Result<String, StorageError>
    where
        R: AsyncBufRead + Unpin,
    {
        if self.router.kind_of(id).await?.is_folder() {
            return Err(StorageError::NotAFile(id.to_string()));
        }

        let debouncer = SaveDebouncer::new(self.router.clone(), self.save_quiet);
        let mut lines = input.lines();
        let mut content = String::new();
        let mut count = 0usize;
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| StorageError::from_io(e, "standard input"))?
        {
            content.push_str(&line);
            content.push('\n');
            count += 1;
            debouncer.schedule(id, content.clone());
        }

        for (saved, result) in debouncer.flush().await {
            result?;
            debug!(id = %saved, "Flushed streamed content");
        }
        Ok(format!("Streamed {} lines into {}", count, id))
    }

    async fn handle_ls(&self) -> Result<String, StorageError> {
        let mut nodes = self.router.list().await?;
        if nodes.is_empty() {
            return Ok("No notes yet.".to_string());
        }
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec!["Id", "Type", "Updated"]);
        for node in &nodes {
            let updated = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(node.updated_at)
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            table.add_row(vec![node.id.clone(), node.kind.as_str().to_string(), updated]);
        }
        Ok(table.to_string())
    }

    async fn handle_new_file(
        &self,
        id: &str,
        content: &str,
        unique: bool,
    ) -> Result<String, StorageError> {
        path::validate_id(id)?;
        let (parent, name) = path::split_parent(id);
        let name = if unique {
            let nodes = self.router.list().await?;
            let siblings = nodes
                .iter()
                .filter(|n| n.parent_id.as_deref() == parent)
                .map(|n| n.name.as_str());
            path::unique_name(siblings, name)
        } else {
            name.to_string()
        };
        let created = self
            .router
            .create(Node::file(parent, &name, content))
            .await?;
        Ok(format!("Created {}", created.id))
    }

    async fn handle_import(&self, file: &std::path::Path, yes: bool) -> Result<String, StorageError> {
        let json = std::fs::read_to_string(file).map_err(|e| StorageError::from_io(e, file.display()))?;
        let backup = Backup::from_json(&json)?;

        if !yes {
            use dialoguer::Confirm;
            let mode = self
                .router
                .mode()
                .map(|m| m.to_string())
                .unwrap_or_default();
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "Replace every note in {} with {} nodes from {}?",
                    mode,
                    backup.nodes.len(),
                    file.display()
                ))
                .default(false)
                .interact()
                .map_err(|e| StorageError::Config(format!("Failed to get user input: {}", e)))?;
            if !confirmed {
                return Ok("Import cancelled".to_string());
            }
        }

        let report = self.router.restore_backup(&backup).await?;
        let mut out = format!("Restored {} nodes", report.copied.len());
        for (id, err) in &report.failed {
            out.push_str(&format!("\n  {} {}: {}", "failed".red(), id, err));
        }
        Ok(out)
    }
}
