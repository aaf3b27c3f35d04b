//! defter: command-line front end for the document ingestion pipeline.
//!
//! Every command prints JSON on stdout; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use defter_ingest::{
    log_pool_metrics, ContentStore, Database, FilesystemBackend, FormatClassifier, IngestConfig,
    IngestService, ListDocumentsRequest, PoolConfig, Scope, UploadRequest,
};

#[derive(Parser)]
#[command(name = "defter")]
#[command(author, version, about = "Financial document ingestion for accounting periods")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ScopeArgs {
    /// Tenant identifier
    #[arg(long, env = "DEFTER_TENANT")]
    tenant: String,

    /// Client identifier within the tenant
    #[arg(long, env = "DEFTER_CLIENT")]
    client: String,

    /// Accounting period (YYYY-Qn)
    #[arg(long)]
    period: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one file
    Upload {
        #[command(flatten)]
        scope: ScopeArgs,

        /// File to upload
        #[arg(short, long)]
        file: PathBuf,

        /// Document type; skips classification when given
        #[arg(short, long)]
        doc_type: Option<String>,

        /// Who is uploading
        #[arg(short, long, env = "DEFTER_ACTOR")]
        actor: String,
    },

    /// List documents of a period, most recent first
    List {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Only this document type
        #[arg(short, long)]
        doc_type: Option<String>,

        /// Include retired documents
        #[arg(long)]
        all: bool,
    },

    /// Correct the document type of an upload
    Override {
        /// Upload record id
        id: Uuid,

        /// New document type
        #[arg(short, long)]
        doc_type: String,

        /// Why the type is being changed
        #[arg(short, long)]
        reason: String,

        #[arg(short, long, env = "DEFTER_ACTOR")]
        actor: String,
    },

    /// Retire an upload (kept for audit, excluded from dedupe and completeness)
    Retire {
        /// Upload record id
        id: Uuid,

        #[arg(short, long)]
        reason: String,

        #[arg(short, long, env = "DEFTER_ACTOR")]
        actor: String,
    },

    /// Report missing documents and the checks they block
    Completeness {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Show the audit trail of a period or of one upload
    Events {
        #[arg(long, env = "DEFTER_TENANT")]
        tenant: Option<String>,

        #[arg(long, env = "DEFTER_CLIENT")]
        client: Option<String>,

        #[arg(long)]
        period: Option<String>,

        /// Only events of this upload
        #[arg(long, conflicts_with = "period")]
        upload: Option<Uuid>,
    },
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

// Logging configuration via environment variables:
//   LOG_FORMAT  - "json" or "text" (default: "text")
//   RUST_LOG    - standard env filter (default: "defter=info,defter_ingest=info,defter_db=info")
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "defter=info,defter_ingest=info,defter_db=info,defter_core=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if log_format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn connect(config: &IngestConfig) -> anyhow::Result<IngestService> {
    let db = Database::connect_with_config(
        &config.database_url,
        PoolConfig::new().max_connections(config.db_max_connections),
    )
    .await
    .context("failed to connect to database")?;
    db.migrate().await.context("failed to run migrations")?;
    log_pool_metrics(db.pool());

    let backend = FilesystemBackend::new(&config.storage_path);
    backend
        .validate()
        .await
        .map_err(|e| anyhow::anyhow!("storage path unusable: {}", e))?;

    Ok(
        IngestService::new(Arc::new(db.uploads.clone()), ContentStore::new(backend))
            .with_classifier(FormatClassifier::new().with_min_score(config.classifier_min_score))
            .with_max_upload_bytes(config.max_upload_bytes),
    )
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = IngestConfig::from_env();
    let service = connect(&config).await?;

    match cli.command {
        Commands::Upload {
            scope,
            file,
            doc_type,
            actor,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let mut req = UploadRequest::new(
                &scope.tenant,
                &scope.client,
                &scope.period,
                &data,
                &filename,
                &actor,
            );
            if let Some(doc_type) = doc_type.as_deref() {
                req = req.with_doc_type(doc_type);
            }

            let outcome = service.upload(req).await?;
            print_json(&outcome)?;
            // A rejected upload is stored, but the command still fails
            outcome.into_result()?;
        }
        Commands::List {
            scope,
            doc_type,
            all,
        } => {
            let records = if all {
                let mut req = ListDocumentsRequest::new(Scope::parse(
                    &scope.tenant,
                    &scope.client,
                    &scope.period,
                )?)
                .including_retired();
                if let Some(doc_type) = doc_type.as_deref() {
                    req = req.with_doc_type(Some(defter_ingest::parse_doc_type(doc_type)?));
                }
                service.list_documents_with(req).await?
            } else {
                service
                    .list_documents(
                        &scope.tenant,
                        &scope.client,
                        &scope.period,
                        doc_type.as_deref(),
                    )
                    .await?
            };
            print_json(&records)?;
        }
        Commands::Override {
            id,
            doc_type,
            reason,
            actor,
        } => {
            let record = service
                .override_doc_type(id, &doc_type, &reason, &actor)
                .await?;
            print_json(&record)?;
        }
        Commands::Retire { id, reason, actor } => {
            let record = service.retire_document(id, &reason, &actor).await?;
            print_json(&record)?;
        }
        Commands::Completeness { scope } => {
            let report = service
                .get_completeness(&scope.tenant, &scope.client, &scope.period)
                .await?;
            print_json(&report)?;
        }
        Commands::Events {
            tenant,
            client,
            period,
            upload,
        } => {
            let events = match (upload, tenant, client, period) {
                (Some(id), ..) => service.events_for_upload(id).await?,
                (None, Some(tenant), Some(client), Some(period)) => {
                    service.list_events(&tenant, &client, &period).await?
                }
                _ => anyhow::bail!("either --upload or --tenant, --client and --period are required"),
            };
            print_json(&events)?;
        }
    }

    Ok(())
}
