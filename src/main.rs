// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sluice::config;
use sluice::generation::{GenerationSource, OpenAiGenerationClient};
use sluice::pipeline::{Pipeline, Services};
use sluice::server;

#[derive(Parser)]
#[command(name = "sluice", about = "Validating stream mediator for LLM data analysis")]
struct Cli {
    /// Path to the sluice.yaml config file
    #[arg(long, default_value = "sluice.yaml", env = "SLUICE_CONFIG")]
    config: PathBuf,

    /// Port to listen on
    #[arg(long, default_value_t = 8000, env = "SLUICE_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let addr = SocketAddr::from(([127, 0, 0, 1], cli.port));
    tracing::info!(%addr, "sluice starting");

    let source = config::FileSource { path: cli.config };
    let config = match config::load_config(&source) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        version = %config.version(),
        environment = %config.runtime.environment,
        model = %config.runtime.generation.model,
        generation_url = %config.runtime.generation.base_url,
        policy_hash = %config.policy_hash,
        "config loaded"
    );

    let generation: Arc<dyn GenerationSource> = Arc::new(OpenAiGenerationClient::new(
        config.runtime.generation.clone(),
    ));
    let pipeline = Arc::new(Pipeline::new(Services::from_config(config, generation)));
    let app = server::build_router(pipeline);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, "failed to bind: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "sluice listening");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}
