use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marquee::config::Config;
use marquee::http::ApiServer;
use marquee::observability;
use marquee::store::{LogMailer, MemoryStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marquee=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => observability::metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "failed to parse metrics address"
            ),
        }
    }

    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(LogMailer);

    let bind: SocketAddr = (Ipv4Addr::UNSPECIFIED, config.port).into();
    let listener = match TcpListener::bind(bind).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(address = %bind, error = %err, "failed to bind listener");
            std::process::exit(1);
        }
    };

    let server = ApiServer::new(config, store.clone(), store, mailer);
    if let Err(err) = server.run(listener).await {
        tracing::error!(error = %err, "server shut down with error");
        std::process::exit(1);
    }
}
