use std::sync::Arc;

use tokio::sync::Notify;

use task_swarm::analyzer::TaskAnalyzer;
use task_swarm::config::SwarmConfig;
use task_swarm::events::EventLog;
use task_swarm::exec::ProcessExecutor;
use task_swarm::http::{AppState, api_routes};
use task_swarm::priority::{self, WeightsHandle};
use task_swarm::problems::ProblemScanner;
use task_swarm::scenario::{self, ScenarioRegistry};
use task_swarm::sink::{LibSqlSink, MetricsSink, spawn_writer};
use task_swarm::store::{FsTaskStore, TaskStore};
use task_swarm::swarm::{AgentContext, AgentRegistry, Swarm};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = SwarmConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: invalid configuration: {e}");
        std::process::exit(1);
    });

    eprintln!("🐝 Task Swarm v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Base dir: {}", config.base_dir.display());
    eprintln!("   Agents: {}", config.agent_count);
    eprintln!("   API: http://0.0.0.0:{}/api/tasks", config.port);
    eprintln!(
        "   Yolo mode: {}\n",
        if config.yolo_mode { "on" } else { "off" }
    );

    // ── Filesystem store + seed files ───────────────────────────────────
    let store: Arc<dyn TaskStore> = Arc::new(
        FsTaskStore::bootstrap(config.tasks_dir())
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: failed to create task folders: {e}");
                std::process::exit(1);
            }),
    );
    scenario::seed_registry_file(&config.scenario_registry_path()).await?;
    priority::seed_weights_file(&config.priority_weights_path()).await?;

    // ── Metrics sink ────────────────────────────────────────────────────
    let sink: Arc<dyn MetricsSink> = Arc::new(
        LibSqlSink::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: failed to open database at {}: {e}",
                    config.db_path.display()
                );
                std::process::exit(1);
            }),
    );
    let (sink_handle, writer_handle) = spawn_writer(sink.clone(), 256);

    // ── Shared services ─────────────────────────────────────────────────
    let weights = Arc::new(WeightsHandle::load(&config.priority_weights_path()));
    let scenarios = Arc::new(ScenarioRegistry::load(&config.scenario_registry_path()));
    let events = EventLog::new(config.events_path());
    let executor = Arc::new(ProcessExecutor::new());
    let registry = Arc::new(AgentRegistry::new());
    let staged_wakeup = Arc::new(Notify::new());

    let analyzer = Arc::new(TaskAnalyzer::new(
        store.clone(),
        executor.clone(),
        weights.clone(),
        events.clone(),
        scenarios.default_selection().command,
        config.prompts_dir(),
        config.execution_timeout,
    ));
    let scanner = Arc::new(ProblemScanner::new(store.clone(), sink.clone()));

    // ── Swarm ───────────────────────────────────────────────────────────
    let ctx = Arc::new(AgentContext {
        store: store.clone(),
        executor,
        scenarios,
        registry,
        events,
        sink: sink_handle.clone(),
        prompts_dir: config.prompts_dir(),
        execution_timeout: config.execution_timeout,
        poll_interval: config.poll_interval,
        staged_wakeup: staged_wakeup.clone(),
    });
    let swarm = Swarm::start(ctx, sink_handle, config.agent_count);

    // ── HTTP server ─────────────────────────────────────────────────────
    let app = api_routes(AppState {
        store,
        sink,
        analyzer,
        scanner,
        weights,
        weights_path: config.priority_weights_path(),
        staged_wakeup,
        yolo_mode: config.yolo_mode,
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    // Agents finish their current task; the writer drains and stops once
    // the last sink handle drops with the swarm.
    swarm.shutdown().await;
    let _ = writer_handle.await;

    Ok(())
}
