use std::sync::Arc;

use crate::config::settings::WorkerConfig;
use crate::infrastructure::api::catalog::{DeliveryMetaClient, StatusClient};
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::infrastructure::storage::s3::StorageService;
use crate::pipeline::packaging::{StreamPackager, ThumbnailExtractor};

#[derive(Clone)]
pub struct WorkerState {
    pub config: WorkerConfig,
    pub storage: StorageService,
    pub queue: RabbitMqService,
    pub status_api: StatusClient,
    pub delivery_api: DeliveryMetaClient,
    /// External collaborators for streaming-package jobs; optional wiring.
    pub packager: Option<Arc<dyn StreamPackager>>,
    pub thumbnailer: Option<Arc<dyn ThumbnailExtractor>>,
}

impl WorkerState {
    pub fn new(
        config: WorkerConfig,
        storage: StorageService,
        queue: RabbitMqService,
        status_api: StatusClient,
        delivery_api: DeliveryMetaClient,
    ) -> Self {
        Self {
            config,
            storage,
            queue,
            status_api,
            delivery_api,
            packager: None,
            thumbnailer: None,
        }
    }
}
