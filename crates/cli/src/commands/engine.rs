// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dalston engine` — query the live engine registry.

use anyhow::Result;
use clap::{Args, Subcommand};
use dalston_store::MetadataStore;

use crate::output::{print_json, print_table, OutputFormat};

#[derive(Args)]
pub struct EngineArgs {
    #[command(subcommand)]
    pub command: EngineCommand,
}

#[derive(Subcommand)]
pub enum EngineCommand {
    /// List every registered engine instance and its heartbeat-derived status.
    List,
}

pub async fn handle(command: EngineCommand, metadata: &dyn MetadataStore, format: OutputFormat) -> Result<()> {
    match command {
        EngineCommand::List => {
            let instances = metadata.get_all_engine_instances().await?;
            match format {
                OutputFormat::Json => print_json(&instances)?,
                OutputFormat::Text => {
                    let now = chrono::Utc::now();
                    let rows: Vec<Vec<String>> = instances
                        .iter()
                        .map(|i| {
                            vec![
                                i.instance_id.to_string(),
                                i.engine_id.to_string(),
                                i.stage.as_str().to_string(),
                                format!("{:?}", i.status),
                                if i.is_available(now) { "available".to_string() } else { "stale".to_string() },
                                i.current_task.as_ref().map(|t| t.to_string()).unwrap_or_else(|| "-".to_string()),
                            ]
                        })
                        .collect();
                    print_table(&["INSTANCE", "ENGINE", "STAGE", "STATUS", "HEARTBEAT", "CURRENT_TASK"], &rows);
                }
            }
        }
    }
    Ok(())
}
