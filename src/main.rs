// Copyright 2026 Gridwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Gridwatch CLI — serve the REST API or run one-shot fetches.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gridwatch_runtime::config::{EngineConfig, DEFAULT_QUERY_SIZE};
use gridwatch_runtime::model::BoundingBox;
use gridwatch_runtime::service::OutageDataService;

#[derive(Parser)]
#[command(name = "gridwatch", version, about = "Power outage data acquisition engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the REST API server.
    Serve {
        /// Port to listen on (overrides GRIDWATCH_HTTP_PORT).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Fetch a snapshot once and print it as JSON.
    Fetch {
        /// Result-set cap.
        #[arg(long, default_value_t = DEFAULT_QUERY_SIZE)]
        size: usize,
        /// Bounding box as north,south,east,west. Omit for the full
        /// service area.
        #[arg(long, value_parser = parse_bbox)]
        bbox: Option<BoundingBox>,
        /// Print only the summary block.
        #[arg(long)]
        summary: bool,
    },
    /// Probe upstream reachability.
    Health,
}

fn parse_bbox(raw: &str) -> std::result::Result<BoundingBox, String> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("invalid coordinate: {e}"))?;
    if parts.len() != 4 {
        return Err("expected north,south,east,west".to_string());
    }
    Ok(BoundingBox {
        north: parts[0],
        south: parts[1],
        east: parts[2],
        west: parts[3],
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gridwatch=info,gridwatch_runtime=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();
    let service = Arc::new(OutageDataService::new(config.clone()));

    match cli.command {
        Command::Serve { port } => {
            let port = port.unwrap_or(config.http_port);
            gridwatch_runtime::rest::start(port, service).await?;
        }
        Command::Fetch {
            size,
            bbox,
            summary,
        } => {
            let snapshot = match bbox {
                Some(bbox) => service.fetch_by_bounding_box(bbox, size).await?,
                None => service.fetch_all(size, false).await?,
            };
            if summary {
                println!("{}", serde_json::to_string_pretty(&snapshot.summary)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            }
        }
        Command::Health => {
            let status = service.health_check().await;
            info!(
                "upstream reachable: {}, credential present: {}",
                status.reachable, status.credential_present
            );
            println!("{}", serde_json::to_string_pretty(&status)?);
            if !status.reachable {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
