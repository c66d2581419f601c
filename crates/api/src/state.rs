use std::sync::Arc;

use scribeflow_events::Broadcaster;
use scribeflow_pipeline::{ContentGenerator, JobRunner, SubmissionGateway};
use scribeflow_registry::JobRegistry;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Job store; the single source of truth for job state.
    pub registry: Arc<JobRegistry>,
    /// Per-job event fan-out.
    pub broadcaster: Arc<Broadcaster>,
    /// Submission, query and deletion entry point.
    pub gateway: Arc<SubmissionGateway>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
}

impl AppState {
    /// Wire the registry, broadcaster, runner and gateway around `generator`.
    pub fn new(config: ServerConfig, generator: Arc<dyn ContentGenerator>) -> Self {
        let registry = Arc::new(JobRegistry::with_log_retention(config.log_retention));
        let broadcaster = Arc::new(Broadcaster::new());

        let runner = JobRunner::new(Arc::clone(&registry), Arc::clone(&broadcaster), generator)
            .with_step_timeout(config.step_timeout());
        let gateway = Arc::new(SubmissionGateway::new(
            Arc::clone(&registry),
            Arc::clone(&broadcaster),
            runner,
        ));

        Self {
            config: Arc::new(config),
            registry,
            broadcaster,
            gateway,
            ws_manager: Arc::new(WsManager::new()),
        }
    }
}
