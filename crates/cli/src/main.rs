// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! dalston - operator CLI for the Dalston orchestration substrate.
//!
//! Talks directly to the same Redis/object-store backend the orchestrator
//! and workers use (there is no API/daemon layer in front of it, §1); it is
//! a thin client over `dalston-store` and `dalston-orchestrator::submit_job`.

mod commands;
mod env;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dalston_store::{FsObjectStore, MetadataStore, ObjectStore, RedisMetadataStore, RedisTaskQueue, TaskQueue};

use commands::{engine, job};
use env::CliEnvConfig;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "dalston", version, about = "Operator CLI for the Dalston orchestration substrate")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t, global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Job submission and inspection
    Job(job::JobArgs),
    /// Engine registry inspection
    Engine(engine::EngineArgs),
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dalston_telemetry::init(Default::default(), "warn,dalston_cli=info");

    let cli = Cli::parse();
    let env = CliEnvConfig::from_env();

    let client = redis::Client::open(env.redis_url.as_str())?;
    let conn = redis::aio::ConnectionManager::new(client).await?;

    let metadata: Box<dyn MetadataStore> = Box::new(RedisMetadataStore::new(conn.clone()));
    let object_store: Box<dyn ObjectStore> = Box::new(FsObjectStore::new(&env.object_store_dir));
    let task_queue: Box<dyn TaskQueue> = Box::new(RedisTaskQueue::new(conn));
    let catalog = dalston_catalog::EngineCatalog::load(&env.catalog_path)?;

    match cli.command {
        Commands::Job(args) => {
            job::handle(
                args.command,
                metadata.as_ref(),
                object_store.as_ref(),
                task_queue.as_ref(),
                &catalog,
                &env.engine_unavailable_policy(),
                cli.output,
            )
            .await
        }
        Commands::Engine(args) => engine::handle(args.command, metadata.as_ref(), cli.output).await,
    }
}
