//! Service entry point: start the pollers, the keepalive ping, and the HTTP
//! server from environment configuration.

use std::path::PathBuf;
use std::sync::Arc;

use sheetflow::config::AppConfig;
use sheetflow::poller::{self, JobRegistry, JsonFileStore};
use sheetflow::server::{self, ServerState};
use sheetflow::sheets::SheetsClient;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env();
    let client = Arc::new(SheetsClient::new());

    let jobs: Vec<_> = config
        .poll_jobs
        .iter()
        .cloned()
        .filter_map(poller::normalize_job)
        .collect();
    let dropped = config.poll_jobs.len() - jobs.len();
    if dropped > 0 {
        log::warn!("poller: dropped {} invalid job definition(s)", dropped);
    }

    let registry = JobRegistry::new(
        jobs,
        Box::new(JsonFileStore::new(config.state_path.clone())),
    );
    let dashboard = Arc::new(config.dashboard.clone());

    if !registry.jobs().is_empty() {
        poller::spawn_polling(
            Arc::clone(&client),
            Arc::clone(&registry),
            config.default_poll_interval,
            Arc::clone(&dashboard),
        );
        log::info!("poller: started {} polling job(s)", registry.jobs().len());
    }

    if let Some(ping) = config.ping.clone() {
        let http = reqwest::Client::new();
        tokio::spawn(async move {
            log::info!("ping: enabled {} every {:?}", ping.url, ping.interval);
            loop {
                tokio::time::sleep(ping.interval).await;
                if let Err(err) = http.get(&ping.url).send().await {
                    log::warn!("ping: failed: {}", err);
                }
            }
        });
    }

    let state = Arc::new(ServerState {
        client,
        registry,
        pivots: config.pivots.clone(),
        dashboard,
        state_path: config.state_path.clone(),
        public_dir: PathBuf::from("public"),
    });
    let app = server::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            log::error!("server: failed to bind {}: {}", addr, err);
            std::process::exit(1);
        }
    };
    log::info!("server: listening on port {}", config.port);

    if let Err(err) = axum::serve(listener, app).await {
        log::error!("server: {}", err);
        std::process::exit(1);
    }
}
