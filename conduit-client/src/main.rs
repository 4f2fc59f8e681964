use std::sync::Arc;
use std::time::Duration;

use conduit_client::{
    ClientConfig, ConversationDriver, DriverSettings, HandshakeOrchestrator, HttpTransport,
};
use conduit_core::{spawn_sweeper, DrbgEngine, ReseedMonitor, SessionStateStore};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let clients_arg = std::env::args().nth(1);
    let config = match ClientConfig::from_env()
        .and_then(|config| config.with_clients_arg(clients_arg.as_deref()))
    {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    let transport = match HttpTransport::new(config.server_url.clone(), config.request_timeout) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let store = Arc::new(SessionStateStore::new(config.store.clone()));
    let _sweeper = spawn_sweeper(store.clone(), SWEEP_INTERVAL);

    let orchestrator = Arc::new(HandshakeOrchestrator::<_, DrbgEngine>::new(
        transport,
        store,
        config.engine.clone(),
        config.request_timeout,
    ));
    let mut driver = ConversationDriver::new(
        orchestrator,
        Arc::new(ReseedMonitor::default()),
        DriverSettings {
            max_trips: config.max_trips,
            max_delay: config.max_delay,
        },
    );

    info!(clients = config.clients, peer = %config.server_url, "Opening conversations");
    let failed = driver.open(config.clients).await;
    for report in &failed {
        if let Some((code, message)) = &report.error {
            warn!(client = report.client, result_code = %code, "Not driven: {}", message);
        }
    }
    if driver.conversations() == 0 {
        error!("No conversation could be opened");
        std::process::exit(1);
    }

    let mut clean = true;
    for _ in 0..config.batches {
        let report = driver.run_batch().await;
        for conversation in report.failures() {
            clean = false;
            match &conversation.error {
                Some((code, message)) => error!(
                    client = conversation.client,
                    result_code = %code,
                    "Conversation failed: {}",
                    message
                ),
                None => error!(
                    client = conversation.client,
                    mismatches = conversation.mismatches,
                    "Conversation saw mismatched replies"
                ),
            }
        }
    }

    if !clean {
        std::process::exit(1);
    }
}
