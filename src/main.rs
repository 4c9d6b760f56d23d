use std::time::Duration;

use dotenvy::dotenv;
use tracing::info;

mod config;
mod error;
mod infrastructure;
mod pipeline;
mod retry;
mod state;
mod workers;

use config::settings::WorkerConfig;
use infrastructure::api::catalog::{DeliveryMetaClient, StatusClient};
use infrastructure::queue::rabbitmq::RabbitMqService;
use infrastructure::storage::s3::StorageService;
use retry::RetryPolicy;
use state::WorkerState;

#[tokio::main]
async fn main() {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting transcode worker...");

    // Configuration problems are the only fatal startup condition.
    let config = WorkerConfig::from_env().expect("worker configuration error");

    let storage = StorageService::new(&config);
    let queue = RabbitMqService::new(&config.amqp_url)
        .await
        .expect("queue connection failed");

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()
        .expect("http client construction failed");
    let retry = RetryPolicy::new(
        Duration::from_millis(500),
        Some(Duration::from_secs(config.http_timeout_secs)),
    );
    let status_api = StatusClient::new(http.clone(), &config, retry.clone());
    let delivery_api = DeliveryMetaClient::new(http, &config, retry);

    let state = WorkerState::new(config, storage, queue, status_api, delivery_api);

    workers::transcoder::start_transcoder_worker(state).await;
}
