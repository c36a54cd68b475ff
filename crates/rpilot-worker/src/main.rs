//! Pipeline worker binary: one claim-process-release invocation per run.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rpilot_firestore::FirestoreProjectStore;
use rpilot_genai::{
    GeminiScriptGenerator, HttpThumbnailSynthesizer, HttpVideoSynthesizer, HttpVoiceSynthesizer,
    OAuthRefresher, WebhookNotifier,
};
use rpilot_models::TickOutcome;
use rpilot_worker::{PipelineEngine, Ports, WorkerConfig, WorkerResult};

fn build_ports() -> WorkerResult<Ports> {
    Ok(Ports {
        script: Arc::new(GeminiScriptGenerator::from_env()?),
        voice: Arc::new(HttpVoiceSynthesizer::from_env()?),
        video: Arc::new(HttpVideoSynthesizer::from_env()?),
        thumbnail: Arc::new(HttpThumbnailSynthesizer::from_env()?),
        notifier: Arc::new(WebhookNotifier::from_env()),
        credentials: Arc::new(OAuthRefresher::from_env()?),
    })
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("rpilot=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting rpilot-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let store = match FirestoreProjectStore::from_env().await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to create project store: {}", e);
            std::process::exit(1);
        }
    };

    let ports = match build_ports() {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to configure providers: {}", e);
            std::process::exit(1);
        }
    };

    let engine = PipelineEngine::new(store, ports, config);

    match engine.tick().await {
        Ok(TickOutcome::NoWork) => info!("No claimable project"),
        Ok(TickOutcome::Advanced {
            project_id,
            previous_stage,
            new_stage,
        }) => info!(
            project_id = %project_id,
            "Advanced {} -> {}", previous_stage, new_stage
        ),
        Ok(TickOutcome::Held { project_id, stage }) => {
            info!(project_id = %project_id, stage = %stage, "Held with partial progress")
        }
        Ok(TickOutcome::Failed {
            project_id,
            stage,
            error,
        }) => info!(
            project_id = %project_id,
            stage = %stage,
            "Project failed: {}", error
        ),
        Err(e) => {
            error!("Invocation failed: {}", e);
            std::process::exit(1);
        }
    }
}
