//! Standalone artifact server binary
//!
//! `start` serves the HTTP API. The `storage` and `repository` commands edit
//! the data directory directly and must not run next to a live server.

use anyhow::{Context, Result};
use artifact_server::{
    namespace::NamespaceIndex,
    run_server,
    types::{DescriptorPolicy, Repository, Storage, VersionPolicy},
    Config,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "artifact-server")]
#[command(about = "Artifact repository server for Maven-layout repositories")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file; built-in defaults when it does not exist
    #[arg(long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Data directory (overrides the configuration file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the artifact server
    Start {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long)]
        port: Option<u16>,
    },

    /// Manage storages
    #[command(subcommand)]
    Storage(StorageCommand),

    /// Manage repositories
    #[command(subcommand)]
    Repository(RepositoryCommand),
}

#[derive(Subcommand)]
enum StorageCommand {
    /// Create a storage
    Create { name: String },
    /// List storages and their repositories
    List,
    /// Delete a storage with all of its repositories
    Delete { name: String },
}

#[derive(Subcommand)]
enum RepositoryCommand {
    /// Create a repository inside a storage
    Create(CreateRepositoryArgs),
    /// Delete a repository and its content
    Delete { storage: String, name: String },
}

#[derive(Args)]
struct CreateRepositoryArgs {
    storage: String,
    name: String,

    /// Version policy: release, snapshot or mixed
    #[arg(long, default_value = "release")]
    policy: VersionPolicy,

    /// Descriptor policy: generate or none
    #[arg(long, default_value = "generate")]
    descriptor: DescriptorPolicy,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = artifact_logging::init_subscriber();

    let cli = Cli::parse();
    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    match cli.command {
        Commands::Start { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            println!("🚀 Starting artifact server on {}", config.server_url());
            run_server(config).await
        }
        Commands::Storage(command) => storage_command(&config, command).await,
        Commands::Repository(command) => repository_command(&config, command).await,
    }
}

fn open_index(config: &Config) -> Result<NamespaceIndex> {
    NamespaceIndex::open(&config.storage.data_dir).with_context(|| {
        format!(
            "Failed to open data directory {}",
            config.storage.data_dir.display()
        )
    })
}

fn find_storage(index: &NamespaceIndex, name: &str) -> Result<Storage> {
    index
        .storage_by_name(name)
        .with_context(|| format!("Storage '{name}' not found"))
}

async fn storage_command(config: &Config, command: StorageCommand) -> Result<()> {
    let index = open_index(config)?;
    match command {
        StorageCommand::Create { name } => {
            let storage = index.create_storage(&name).await?;
            println!("✅ Created storage '{}' (id {})", storage.name, storage.id);
        }
        StorageCommand::List => {
            let storages = index.storages();
            if storages.is_empty() {
                println!("No storages");
            }
            for storage in storages {
                println!("{} (id {})", storage.name, storage.id);
                for repo in &storage.repositories {
                    println!("  {} [{}]", repo.name, repo.policy);
                }
            }
        }
        StorageCommand::Delete { name } => {
            let storage = find_storage(&index, &name)?;
            index.delete_storage(storage.id).await?;
            println!("✅ Deleted storage '{name}'");
        }
    }
    Ok(())
}

async fn repository_command(config: &Config, command: RepositoryCommand) -> Result<()> {
    let index = open_index(config)?;
    match command {
        RepositoryCommand::Create(args) => {
            let storage = find_storage(&index, &args.storage)?;
            let mut repository = Repository::new(args.name, args.policy);
            repository.descriptor = args.descriptor;
            let repository = index.create_repository(storage.id, repository).await?;
            println!(
                "✅ Created repository '{}/{}' ({})",
                storage.name, repository.name, repository.policy
            );
        }
        RepositoryCommand::Delete { storage, name } => {
            let found = find_storage(&index, &storage)?;
            index.delete_repository(found.id, &name).await?;
            println!("✅ Deleted repository '{storage}/{name}'");
        }
    }
    Ok(())
}
