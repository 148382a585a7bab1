use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::asset::{AssetRegistry, FsStorage, VodStorage};
use crate::config::Config;
use crate::error::Result;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Assets discovered under the VoD root at startup
    pub registry: Arc<AssetRegistry>,
    /// Read access to the VoD files
    pub storage: Arc<dyn VodStorage>,
    /// Process start, used for the handover schedule and health reporting
    pub boot_time: Instant,
    /// Prometheus render handle; absent when a recorder was already installed
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Create a new AppState with the given configuration
    pub fn new(config: Config) -> Result<Self> {
        let registry = AssetRegistry::load(&config.vod_root)?;
        let storage = FsStorage::new(&config.vod_root);

        // A second install (another router in the same process, as in tests)
        // keeps the existing global recorder and just loses the render handle.
        let metrics_handle = PrometheusBuilder::new().install_recorder().ok();

        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            storage: Arc::new(storage),
            boot_time: Instant::now(),
            metrics_handle,
        })
    }
}
