//! CLI entry point for running the outbox pipeline.
//!
//! Connects to Postgres, optionally applies migrations, runs the pipeline
//! (for one tenant or all active tenants), and prints the run report as
//! JSON. Exits non-zero if the store is unreachable or the run fails.

use anyhow::Context;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use vellum_outbox::{PipelineConfig, PipelineRunner};

#[derive(Parser, Debug)]
#[command(name = "pipeline-runner", about = "Run the webhook outbox pipeline")]
struct Args {
    /// Run only for this tenant (UUID or slug); all active tenants otherwise.
    #[arg(long)]
    tenant: Option<String>,

    /// Apply pending database migrations before running.
    #[arg(long)]
    migrate: bool,

    /// Postgres connection string; falls back to DATABASE_URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&args.database_url)
        .await
        .context("failed to connect to database")?;

    if args.migrate {
        vellum_db::run_migrations(&pool)
            .await
            .context("failed to apply migrations")?;
        tracing::info!("Migrations applied");
    }

    let config = PipelineConfig::from_env();
    let runner = PipelineRunner::new(pool, config).context("failed to build pipeline")?;

    match args.tenant {
        Some(tenant_ref) => {
            let summary = runner
                .run_for_tenant(&tenant_ref)
                .await
                .context("pipeline run failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        None => {
            let report = runner.run_all().await.context("pipeline run failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
