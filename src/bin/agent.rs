use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use netadmin_agent::bus::BroadcastBus;
use netadmin_agent::config::load_config;
use netadmin_agent::db::services::PgTargetStore;
use netadmin_agent::monitoring::alert::AlertDispatcher;
use netadmin_agent::monitoring::config_listener;
use netadmin_agent::monitoring::prober::Prober;
use netadmin_agent::monitoring::scheduler::MonitorScheduler;
use netadmin_agent::monitoring::task_listener::TaskListener;
use netadmin_agent::version::VERSION;

fn init_logging() {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily("logs", "agent.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.contains(&"--version".to_string()) {
        println!("Agent version: {VERSION}");
        return Ok(());
    }

    dotenv::dotenv().ok();
    init_logging();
    info!(version = VERSION, "Starting agent...");

    let config_path = "agent_config.toml";
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Critical error loading configuration. Exiting.");
            return Err(e);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let store = Arc::new(PgTargetStore::new(Arc::new(pool)));

    let bus = Arc::new(BroadcastBus::new());
    let prober = Arc::new(Prober::new(Duration::from_millis(config.probe_timeout_ms)));
    let alerts = Arc::new(AlertDispatcher::new(bus.clone()));

    let scheduler = Arc::new(MonitorScheduler::new(
        store,
        prober,
        alerts,
        config.scheduler_pool_size,
    ));
    scheduler.start().await;

    let config_listener_handle = config_listener::start(bus.clone(), scheduler.clone()).await?;
    let task_listener_handle = TaskListener::new(config.mdaemon_trigger_path.clone())
        .start(bus.clone())
        .await?;

    info!("Agent running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, stopping...");
    scheduler.stop().await;
    config_listener_handle.abort();
    task_listener_handle.abort();

    Ok(())
}
