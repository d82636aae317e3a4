use statsd_server::aggregate::Registry;
use statsd_server::backend::{ConsoleBackend, RegistryBackend, SharedBackend};
use statsd_server::config::ServerConfig;
use statsd_server::server::{ConsoleSink, Reporter, UdpServer};
use std::sync::Arc;
use tracing::info;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match std::env::var("STATSD_CONFIG") {
        Ok(path) => {
            info!("Loading configuration from {}", path);
            ServerConfig::from_file(&path)?
        }
        Err(_) => ServerConfig::default(),
    };

    let registry = Arc::new(Registry::with_reservoir_size(config.reservoir_size));
    let backend: SharedBackend = if std::env::var_os("STATSD_ECHO").is_some() {
        info!("Echo mode: printing decoded events instead of aggregating");
        Arc::new(ConsoleBackend)
    } else {
        Arc::new(RegistryBackend::new(registry.clone()))
    };

    let server = UdpServer::bind(&config, backend).await?;
    let reporter = Reporter::new(registry, Arc::new(ConsoleSink), &config);

    println!("🚀 statsd server listening on udp://{}", server.local_addr());
    println!(
        "   reporting every {:?} as {:?} lines",
        config.report_interval(),
        config.report_format
    );
    println!();

    server.start()?;
    reporter.start()?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    reporter.stop().await;
    server.stop().await;

    Ok(())
}
