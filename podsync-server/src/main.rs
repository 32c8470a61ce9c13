mod config;
mod ops;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use podsync_compaction::{CompactionOptions, CompactionWorker};
use podsync_core::{Clock, SystemClock};
use podsync_dispatcher::{Dispatcher, DispatcherOptions};
use podsync_events::{EventLog, InMemoryEventLog, SledEventLog};
use podsync_process_manager::{InMemoryCheckpointStore as ProcessManagerCheckpoint, ProcessManager};
use podsync_projections::{
    ActivityProjector, CollectionsProjector, CollectionsTable, InMemoryCheckpointStore as ProjectorCheckpoint,
    PlayStatusProjector, PlayStatusesTable, PlaylistsProjector, PlaylistsTable, PopularityTable, PrivacyProjector,
    ProjectionPipeline, PublicEventsTable, SubscriptionsProjector, SubscriptionsTable, UserPrivacyTable,
};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

/// Spec §4.7 names this interval informally ("roughly every 15 minutes");
/// it isn't among the enumerated config values, so it's a constant here.
const COMPACTION_TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(15 * 60);

#[derive(Parser)]
#[command(name = "podsync-server")]
#[command(about = "Podsync event-sourced sync engine")]
struct Cli {
    /// Path (without extension) to a config file readable by the `config` crate
    #[arg(long)]
    config: Option<String>,

    /// Override the configured bind address
    #[arg(long)]
    bind_addr: Option<String>,

    /// Use an in-memory event log instead of the sled-backed one, ignoring `data_dir`
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut podsync_config = config::load(cli.config.as_deref())?;
    if let Some(bind_addr) = cli.bind_addr {
        podsync_config.http.bind_addr = bind_addr;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&podsync_config.logging.level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if podsync_config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let event_log: Arc<dyn EventLog> = if cli.in_memory {
        info!("using in-memory event log");
        Arc::new(InMemoryEventLog::new())
    } else {
        let data_dir = &podsync_config.storage.data_dir;
        info!(data_dir, "opening sled event log");
        Arc::new(SledEventLog::open(data_dir)?)
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let dispatcher = Arc::new(Dispatcher::new(
        event_log.clone(),
        clock.clone(),
        DispatcherOptions {
            max_retries: podsync_config.dispatcher.max_retries,
            command_default_deadline: std::time::Duration::from_millis(podsync_config.dispatcher.command_default_deadline_ms),
            queue_capacity: podsync_config.dispatcher.queue_capacity,
        },
    ));

    let subscriptions = Arc::new(SubscriptionsTable::default());
    let play_statuses = Arc::new(PlayStatusesTable::default());
    let playlists = Arc::new(PlaylistsTable::default());
    let privacy = Arc::new(UserPrivacyTable::default());
    let collections = Arc::new(CollectionsTable::default());
    let public_events = Arc::new(PublicEventsTable::default());
    let popularity = Arc::new(PopularityTable::default());

    let mut pipeline = ProjectionPipeline::new(event_log.clone(), Arc::new(ProjectorCheckpoint::default()));
    pipeline.register(Arc::new(SubscriptionsProjector { table: subscriptions.clone() }));
    pipeline.register(Arc::new(PlayStatusProjector { table: play_statuses.clone() }));
    pipeline.register(Arc::new(PlaylistsProjector { table: playlists.clone() }));
    pipeline.register(Arc::new(PrivacyProjector { table: privacy.clone() }));
    pipeline.register(Arc::new(CollectionsProjector { table: collections.clone() }));
    let activity = Arc::new(ActivityProjector::new(public_events, popularity, privacy.clone()));
    pipeline.register(activity.clone());
    let projector_handles = pipeline.spawn_all();
    info!(count = projector_handles.len(), "projectors running");

    let process_manager = Arc::new(ProcessManager::new(
        event_log.clone(),
        dispatcher.clone(),
        Arc::new(ProcessManagerCheckpoint::new()),
    ));
    let process_manager_handle = process_manager.spawn();

    let compaction = Arc::new(CompactionWorker::new(
        event_log.clone(),
        dispatcher.clone(),
        activity,
        clock,
        CompactionOptions {
            tick_interval: COMPACTION_TICK_INTERVAL,
            retention_checkpoint_days: podsync_config.retention.checkpoint_days as i64,
            retention_prune_days: podsync_config.retention.prune_days as i64,
        },
    ));
    let (compaction_tracker, compaction_ticker) = compaction.spawn();

    let prometheus = PrometheusBuilder::new().install_recorder()?;
    let app = ops::router(prometheus);
    let listener = tokio::net::TcpListener::bind(&podsync_config.http.bind_addr).await?;
    info!(addr = %podsync_config.http.bind_addr, "ops endpoint listening");
    let ops_server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    wait_for_shutdown().await;
    info!("shutting down");

    ops_server.abort();
    process_manager_handle.abort();
    compaction_tracker.abort();
    compaction_ticker.abort();
    for handle in projector_handles {
        handle.abort();
    }

    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
