use std::sync::Arc;

use gridlab_cache::{CacheError, JsonArtifactParser, ResultCache};
use gridlab_events::ProgressBus;
use gridlab_supervisor::{JobRegistry, Supervisor};

use crate::config::ServerConfig;

/// The result cache served over HTTP.
pub type ArtifactCache = ResultCache<JsonArtifactParser>;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Job supervisor (owns the job registry).
    pub supervisor: Arc<Supervisor>,
    /// Per-class progress channels shared by the supervisor and streams.
    pub bus: Arc<ProgressBus>,
    /// Two-tier artifact cache.
    pub cache: Arc<ArtifactCache>,
}

impl AppState {
    /// Wire up the bus, supervisor and cache from `config`.
    ///
    /// Fails only if the cache's disk tier cannot be opened.
    pub fn new(config: ServerConfig) -> Result<Self, CacheError> {
        let bus = Arc::new(ProgressBus::new(config.stream.queue_capacity));
        let supervisor = Arc::new(Supervisor::new(
            config.supervisor.clone(),
            Arc::new(JobRegistry::new()),
            Arc::clone(&bus),
        ));
        let cache = Arc::new(ResultCache::open(config.cache.clone(), JsonArtifactParser)?);

        Ok(Self {
            config: Arc::new(config),
            supervisor,
            bus,
            cache,
        })
    }
}
