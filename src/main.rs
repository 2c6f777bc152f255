use anyhow::Result;
use clap::Parser;
use procwatch::{
    config::{Config, ConfigError}, ConnectionManager, ConnectionStatus, ModelObserver, Monitor, Phase,
    ProcessModel, TickDelta,
};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "procwatch", about = "Follow per-process USS from a procserver")]
struct Args {
    /// Config file (defaults to the per-user config directory)
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Print the final model as JSON on exit
    #[arg(long, default_value_t = false)]
    json: bool,
}

/// Reports model changes through the log.
struct LogObserver;

#[async_trait::async_trait]
impl ModelObserver for LogObserver {
    async fn on_status(&mut self, status: &ConnectionStatus) {
        match status.phase {
            Phase::Failed => warn!("Connection failed: {}", status.detail),
            Phase::Closed => info!("Connection closed: {}", status.detail),
            Phase::Connecting | Phase::Connected => info!("{}", status),
        }
    }

    async fn on_model(&mut self, model: &ProcessModel, delta: &TickDelta) {
        for pid in &delta.started {
            if let Some(record) = model.get(*pid) {
                info!(
                    "+ {} ({}) {:.3} MB",
                    pid,
                    record.display_name(),
                    record.last_sample().unwrap_or_default()
                );
            }
        }
        for pid in &delta.stopped {
            if let Some(record) = model.get(*pid) {
                info!(
                    "- {} ({}) after {} ticks, peak {:.3} MB",
                    pid,
                    record.display_name(),
                    record.samples.len(),
                    record.peak_mb().unwrap_or_default()
                );
            }
        }
        for pid in &delta.renamed {
            if let Some(record) = model.get(*pid) {
                info!("~ {} renamed to {}", pid, record.display_name());
            }
        }
        debug!(
            "tick {}: {} active, {:.3} MB total, {} updates",
            delta.tick,
            model.active().count(),
            model.total_active_mb(),
            delta.updated.len()
        );
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(Config::config_path);
    Config::load_or_default(&path)
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (config, load_error) = match load_config(args.config) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    init_logging(&config);
    if let Some(e) = load_error {
        warn!("Failed to load config: {}, using defaults", e);
    }

    let mut options = config.connection_options();
    if let Some(host) = args.host {
        options.host = host;
    }
    if let Some(port) = args.port {
        options.port = port;
    }

    let (handle, events) = ConnectionManager::new(options).start();
    let mut monitor = Monitor::new();
    let mut observer = LogObserver;

    let status = {
        let run = monitor.run(events, &mut observer);
        tokio::pin!(run);
        tokio::select! {
            status = &mut run => status,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                handle.request_shutdown();
                // Keep draining so the final blocks and `Closed` still arrive.
                run.await
            }
        }
    };
    handle.join().await;

    let model = monitor.into_model();
    info!("Stopped at tick {} with {} processes seen", model.tick(), model.len());
    if args.json {
        println!("{}", serde_json::to_string_pretty(&model)?);
    }

    if status.is_some_and(|s| s.phase == Phase::Failed) {
        anyhow::bail!("could not connect");
    }
    Ok(())
}
