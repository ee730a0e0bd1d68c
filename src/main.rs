//! # kvsecretctl
//!
//! Reconciles a YAML manifest of secrets against Azure Key Vault.
//!
//! ```bash
//! # What would change
//! kvsecretctl --manifest secrets.yaml plan
//!
//! # Apply it, keeping observed state in .kvsecret/state.json
//! kvsecretctl --manifest secrets.yaml apply
//!
//! # Publish one value without a manifest
//! kvsecretctl publish --store vault-a --name app.db.password --value-from-env DB_PASSWORD
//!
//! # Delete everything recorded in state
//! kvsecretctl destroy
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use keyvault_secret_provider::cache::{
    ClientCache, InMemoryStoreFactory, KeyVaultStoreFactory, StoreFactory,
};
use keyvault_secret_provider::config::{LogFormat, ProviderConfig};
use keyvault_secret_provider::constants::DEFAULT_STATE_PATH;
use keyvault_secret_provider::engine::{Engine, Manifest, RunReport, StateStore};
use keyvault_secret_provider::facade::{PublishRequest, SecretFacade};
use keyvault_secret_provider::observability::{init_logging, metrics};
use keyvault_secret_provider::provider::secret::SecretProvider;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Key Vault secret reconciliation CLI
#[derive(Parser)]
#[command(name = "kvsecretctl")]
#[command(
    about = "Reconcile secrets in Azure Key Vault",
    long_about = None,
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_GIT_HASH"), " ", env!("BUILD_DATETIME"), ")"),
    after_help = "\
Examples:
  kvsecretctl --manifest secrets.yaml plan
  kvsecretctl --manifest secrets.yaml apply
  kvsecretctl publish --store vault-a --name db-pass --value-from-env DB_PASSWORD
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// State file path
    #[arg(long, global = true, env = "KVSECRET_STATE", default_value = DEFAULT_STATE_PATH)]
    state: PathBuf,

    /// Manifest of desired secrets (plan, apply)
    #[arg(short, long, global = true, env = "KVSECRET_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Log output format (text or json)
    #[arg(long, global = true, env = "LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Print Prometheus metrics to stdout when done
    #[arg(long, global = true)]
    emit_metrics: bool,

    /// Use a process-local store instead of Key Vault
    #[arg(long, global = true, hide = true)]
    in_memory: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what apply would change
    Plan,
    /// Reconcile the manifest and delete secrets no longer in it
    Apply,
    /// Delete every secret recorded in state
    Destroy,
    /// Publish a single secret
    Publish {
        /// Secret name (normalized before use)
        #[arg(long)]
        name: String,

        /// Key Vault name or URL
        #[arg(long)]
        store: String,

        /// Secret value
        #[arg(long, conflicts_with = "value_from_env")]
        value: Option<String>,

        /// Read the value from this environment variable
        #[arg(long)]
        value_from_env: Option<String>,

        /// Content type (defaults to the secret name)
        #[arg(long)]
        content_type: Option<String>,

        /// Tag as key=value, repeatable
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Vec<(String, String)>,

        /// Key in the state file (defaults to the normalized name)
        #[arg(long)]
        resource: Option<String>,

        /// Record the secret but never write it again
        #[arg(long)]
        ignore_change: bool,
    },
}

fn parse_tag(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {raw}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install the ring crypto provider before any TLS client is created
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();
    let mut config = ProviderConfig::from_env();
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }
    if let Err(err) = init_logging(&config.log_level, config.log_format) {
        eprintln!("failed to initialize logging: {err}");
    }
    metrics::register_metrics()?;

    let factory: Arc<dyn StoreFactory> = if cli.in_memory {
        warn!("Using in-memory store; nothing is written to Key Vault");
        Arc::new(InMemoryStoreFactory::default())
    } else {
        Arc::new(
            KeyVaultStoreFactory::from_config(config.clone())
                .context("Failed to create Key Vault client factory")?,
        )
    };
    let cache = Arc::new(ClientCache::new(factory));
    let provider = Arc::new(SecretProvider::new(cache, config.recovery_policy()));
    let engine = Engine::new(SecretFacade::new(provider), StateStore::new(&cli.state));

    let success = run(&cli, &engine).await?;

    if cli.emit_metrics {
        print!("{}", metrics::gather_text()?);
    }
    if !success {
        bail!("one or more resources failed");
    }
    Ok(())
}

async fn run(cli: &Cli, engine: &Engine) -> Result<bool> {
    match &cli.command {
        Commands::Plan => {
            let requests = load_requests(cli).await?;
            let changes = engine.plan(requests).await?;
            for change in &changes {
                if change.changed.is_empty() {
                    println!("{:>8}  {}", change.action, change.resource);
                } else {
                    println!(
                        "{:>8}  {}  ({})",
                        change.action,
                        change.resource,
                        change.changed.join(", ")
                    );
                }
            }
            Ok(true)
        }
        Commands::Apply => {
            let requests = load_requests(cli).await?;
            let report = engine.apply(requests).await?;
            print_report(&report);
            Ok(report.is_success())
        }
        Commands::Destroy => {
            let report = engine.destroy().await?;
            print_report(&report);
            Ok(report.is_success())
        }
        Commands::Publish {
            name,
            store,
            value,
            value_from_env,
            content_type,
            tags,
            resource,
            ignore_change,
        } => {
            let value = match (value, value_from_env) {
                (Some(value), _) => value.clone(),
                (None, Some(var)) => std::env::var(var)
                    .with_context(|| format!("environment variable {var} is not set"))?,
                (None, None) => String::new(),
            };
            let request = PublishRequest {
                name: name.clone(),
                value,
                store_name: store.clone(),
                content_type: content_type.clone(),
                tags: tags.iter().cloned().collect::<BTreeMap<_, _>>(),
                ignore_change: *ignore_change,
                resource_name: resource.clone(),
            };
            let report = engine.publish(request).await?;
            println!(
                "{:>8}  {}  {}",
                report.action,
                report.resource,
                report.id.unwrap_or_default()
            );
            Ok(true)
        }
    }
}

async fn load_requests(cli: &Cli) -> Result<Vec<PublishRequest>> {
    let path = cli
        .manifest
        .as_ref()
        .context("--manifest is required for this command")?;
    let manifest = Manifest::from_path(path)
        .await
        .with_context(|| format!("Failed to load manifest {}", path.display()))?;
    info!(secrets = manifest.secrets.len(), "Loaded manifest");
    Ok(manifest.into_requests(|var| std::env::var(var).ok())?)
}

fn print_report(report: &RunReport) {
    for applied in &report.applied {
        println!(
            "{:>8}  {}  {}",
            applied.action,
            applied.resource,
            applied.id.as_deref().unwrap_or("")
        );
    }
    for failed in &report.failed {
        eprintln!("  failed  {}  ({}): {}", failed.resource, failed.action, failed.error);
    }
    println!(
        "{} changed, {} failed",
        report.changed(),
        report.failed.len()
    );
}
