//! CLI commands for migration runs, record listing and source cleanup.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::Table;
use thiserror::Error;
use tracing::info;

use crate::cleanup::{CleanupCoordinator, CleanupFilter};
use crate::config::Ctx;
use crate::handlers::HandlerRegistry;
use crate::manager::{MigrationManager, RunRequest, RunSettings};
use crate::resource::ResourceType;
use crate::session::SessionPair;
use crate::store::{MigrationRecord, MigrationStore, RecordQuery};

#[derive(Debug, Parser)]
#[command(name = "strato-migrate")]
#[command(about = "Cloud-to-cloud resource migration orchestrator")]
#[command(version)]
pub struct Cli {
    /// Path to TOML configuration file
    #[arg(long, env = "STRATO_MIGRATE_CONFIG")]
    pub config: PathBuf,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table
    Table,
    /// Full records as JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Migrate resources from the source cloud to the destination
    Start {
        /// Resource type to migrate (wire name, e.g. domain, volume-type);
        /// repeatable
        #[arg(short = 't', long = "resource-type", required = true)]
        resource_types: Vec<ResourceType>,
        /// Explicit source resource id; requires exactly one --resource-type
        #[arg(short = 'i', long = "source-id")]
        source_ids: Vec<String>,
        /// Source enumeration filter as key=value; repeatable
        #[arg(short = 'f', long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
        /// Re-run resources that are already migrated
        #[arg(long)]
        force: bool,
        /// Remove the source copies after a fully successful run
        #[arg(long = "cleanup-source")]
        cleanup_source: bool,
    },
    /// List migration records
    List {
        /// Only records owned by this service (e.g. keystone, cinder)
        #[arg(long)]
        service: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// List the supported resource types with their owning service and
    /// accepted filter keys
    Types,
    /// Delete source copies of migrated resources
    CleanupSource {
        /// Only resources owned by this service
        #[arg(long)]
        service: Option<String>,
        /// Only resources of this type
        #[arg(long = "resource-type")]
        resource_type: Option<ResourceType>,
        /// Only the resource with this source id
        #[arg(long = "source-id")]
        source_id: Option<String>,
        /// Clean up every migrated resource
        #[arg(long)]
        all: bool,
        /// Log what would be deleted without deleting anything
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("No filters specified. Use '--all' to clean up every migrated resource")]
    MissingCleanupFilter,
}

fn parse_key_value(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{input}'"))?;
    if key.is_empty() {
        return Err(format!("empty filter key in '{input}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

pub async fn run(ctx: Ctx, command: Commands) -> anyhow::Result<()> {
    let store = MigrationStore::open(&ctx.database_path).await?;
    let sessions = ctx.session_pair()?;
    run_command_with_writers(
        command,
        store,
        sessions,
        ctx.run_settings(),
        &mut std::io::stdout(),
    )
    .await
}

async fn run_command_with_writers<W: Write>(
    command: Commands,
    store: MigrationStore,
    sessions: SessionPair,
    settings: RunSettings,
    stdout: &mut W,
) -> anyhow::Result<()> {
    match command {
        Commands::Start {
            resource_types,
            source_ids,
            filters,
            force,
            cleanup_source,
        } => {
            let registry = HandlerRegistry::new(&sessions);
            let manager = MigrationManager::new(store.clone(), registry, settings)?;
            let request = RunRequest {
                resource_types: resource_types.clone(),
                source_ids,
                filters: filters.into_iter().collect::<BTreeMap<_, _>>(),
                force,
            };
            let summary = manager.run(&request).await?;
            writeln!(
                stdout,
                "migrated: {}, skipped: {}, failed: {}, blocked: {}",
                summary.migrated, summary.skipped, summary.failed, summary.blocked
            )?;

            if cleanup_source {
                if !summary.all_succeeded() {
                    info!("skipping source cleanup: the run was not fully successful");
                    return Ok(());
                }
                let cleanup =
                    CleanupCoordinator::new(store, Arc::new(HandlerRegistry::new(&sessions)));
                // Dependents give up their source copies before the
                // resources they point at.
                let mut ordered = crate::plan::order_types(&resource_types)?;
                ordered.reverse();
                for resource_type in ordered {
                    let filter = CleanupFilter {
                        resource_type: Some(resource_type),
                        ..CleanupFilter::default()
                    };
                    let summary = cleanup.run(&filter, false).await?;
                    writeln!(
                        stdout,
                        "cleanup {resource_type}: removed: {}, failed: {}",
                        summary.removed, summary.failed
                    )?;
                }
            }
            Ok(())
        }
        Commands::List { service, format } => {
            let mut query = RecordQuery::default();
            if let Some(service) = service {
                query = query.service(service);
            }
            let records = store.list(&query).await?;
            match format {
                OutputFormat::Json => {
                    writeln!(stdout, "{}", serde_json::to_string_pretty(&records)?)?;
                }
                OutputFormat::Table => {
                    writeln!(stdout, "{}", render_table(&records))?;
                }
            }
            Ok(())
        }
        Commands::Types => {
            let registry = HandlerRegistry::new(&sessions);
            let mut table = Table::new();
            table.set_header(vec!["Resource type", "Service", "Filters"]);
            for (resource_type, handler) in registry.all() {
                table.add_row(vec![
                    resource_type.to_string(),
                    handler.service_type().to_string(),
                    handler.supported_filters().join(", "),
                ]);
            }
            writeln!(stdout, "{table}")?;
            Ok(())
        }
        Commands::CleanupSource {
            service,
            resource_type,
            source_id,
            all,
            dry_run,
        } => {
            let filter = CleanupFilter {
                service,
                resource_type,
                source_id,
            };
            if filter.is_empty() && !all {
                return Err(CliError::MissingCleanupFilter.into());
            }
            let cleanup =
                CleanupCoordinator::new(store, Arc::new(HandlerRegistry::new(&sessions)));
            let summary = cleanup.run(&filter, dry_run).await?;
            writeln!(
                stdout,
                "selected: {}, removed: {}, failed: {}",
                summary.selected, summary.removed, summary.failed
            )?;
            Ok(())
        }
    }
}

fn render_table(records: &[MigrationRecord]) -> String {
    let mut table = Table::new();
    table.set_header(vec![
        "UUID",
        "Service",
        "Resource type",
        "Status",
        "Source ID",
        "Destination ID",
    ]);
    for record in records {
        table.add_row(vec![
            record.uuid.to_string(),
            record.service.clone(),
            record.resource_type.to_string(),
            record.status.to_string(),
            record.source_id.clone(),
            record.destination_id.clone().unwrap_or_default(),
        ]);
    }
    table.to_string()
}
