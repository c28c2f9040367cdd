//! HTTP server command implementation.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

use convoy::admission::AdmissionController;
use convoy::assistant::{AssistantRegistry, ClaudeCliClient, ClaudeCliConfig};
use convoy::build_info;
use convoy::command::BuiltinCommands;
use convoy::config::{self, Config};
use convoy::gateway::{GatewayManager, GatewayMessageHandler, TestGateway};
use convoy::server::{self, AppState};
use convoy::session::{Orchestrator, OrchestratorDeps};
use convoy::store::file::{FileCodebaseStore, FileConversationStore, FileSessionStore};
use convoy::store::{CodebaseStore, ConversationStore, SessionStore};

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    pub max_concurrent: Option<usize>,
}

pub async fn run(config_path: &str, overrides: Overrides) -> Result<()> {
    let mut config = Config::load(config_path)
        .await
        .with_context(|| format!("failed to load {config_path}"))?;

    // CLI overrides config
    if let Some(host) = overrides.host {
        config.server.host = host.to_string();
    }
    if let Some(port) = overrides.port {
        config.server.port = port;
    }
    if let Some(max) = overrides.max_concurrent {
        config.concurrency.max_concurrent_conversations = max;
    }

    let config_path_ref = Path::new(config_path);
    let workspace = config.workspace_dir(config_path_ref);
    let storage = config.storage_dir(config_path_ref);
    info!(
        version = %build_info::version_string(),
        workspace = %workspace.display(),
        storage = %storage.display(),
        "Starting Convoy"
    );

    // Stores
    let conversations: Arc<dyn ConversationStore> =
        Arc::new(FileConversationStore::new(storage.join(config::CONVERSATIONS_DIR)));
    let sessions: Arc<dyn SessionStore> =
        Arc::new(FileSessionStore::new(storage.join(config::SESSIONS_DIR)));
    let codebases: Arc<dyn CodebaseStore> =
        Arc::new(FileCodebaseStore::new(storage.join(config::CODEBASES_DIR)));

    // Assistants
    let mut assistants = AssistantRegistry::new();
    let claude = &config.assistant.claude;
    // Bare names are looked up on PATH; paths are relative to the config file
    let claude_command = if claude.command.contains('/') {
        config::resolve_path(config_path_ref, Path::new(&claude.command))
            .to_string_lossy()
            .into_owned()
    } else {
        claude.command.clone()
    };
    assistants.register(
        "claude",
        Arc::new(ClaudeCliClient::new(ClaudeCliConfig {
            command: claude_command,
            args: claude.args.clone(),
        })),
    );
    if assistants.get(&config.assistant.default).is_err() {
        warn!(
            assistant = %config.assistant.default,
            available = ?assistants.names(),
            "Default assistant is not registered"
        );
    }

    let commands = Arc::new(BuiltinCommands::new(
        conversations.clone(),
        sessions.clone(),
        codebases.clone(),
        &workspace,
    ));

    let orchestrator = Arc::new(Orchestrator::new(OrchestratorDeps {
        conversations,
        sessions,
        codebases,
        commands,
        assistants,
        default_assistant: config.assistant.default.clone(),
        workflow: config.workflow.clone(),
        stream_timeout: config.concurrency.stream_timeout(),
    }));

    // Admission and gateways
    let admission = AdmissionController::new(config.concurrency.max_concurrent_conversations);
    info!(
        max_concurrent = admission.max_concurrent(),
        stream_timeout_seconds = config.concurrency.stream_timeout_seconds,
        "Admission controller initialized"
    );

    let gateways = GatewayManager::new();
    let handler = GatewayMessageHandler::new(orchestrator, admission.clone(), gateways.clone());
    gateways.set_handler(Arc::new(handler)).await;

    let test_gateway = if config.gateways.test.enabled {
        Some(TestGateway::start(&gateways, config.gateways.test.streaming_mode).await)
    } else {
        None
    };

    let state = AppState {
        admission,
        gateways: gateways.clone(),
        test_gateway,
    };
    let app = server::build_app(state, config.server.request_timeout_seconds);

    let ip: IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("invalid server host '{}'", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(addr = %addr, "Starting server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    gateways.shutdown().await;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
