use std::sync::Arc;

use crate::bridge::BridgeSynchronizer;
use crate::broadcast::BroadcastHub;
use crate::config::SyncConfig;
use crate::document::{Abilities, Document, QueryCache};
use crate::memory::{MemoryDocumentApi, RecordingBridge};
use crate::notice::NoticeCenter;
use crate::pipeline::MutationPipeline;

/// Memory collaborators wired into a pipeline
pub(crate) struct Fixture {
    pub api: Arc<MemoryDocumentApi>,
    pub bridge: Arc<RecordingBridge>,
    pub cache: Arc<QueryCache>,
    pub hub: Arc<BroadcastHub>,
    pub notices: Arc<NoticeCenter>,
    pub config: SyncConfig,
    pub pipeline: MutationPipeline,
}

impl Fixture {
    pub fn new() -> Self {
        let config = SyncConfig::default();
        let api = Arc::new(MemoryDocumentApi::new());
        let bridge = Arc::new(RecordingBridge::new());
        let cache = Arc::new(QueryCache::new());
        let hub = Arc::new(BroadcastHub::new(config.broadcast_capacity));
        let pipeline = MutationPipeline::new(
            api.clone(),
            cache.clone(),
            BridgeSynchronizer::new(bridge.clone()),
            hub.clone(),
            &config,
        );

        Self {
            api,
            bridge,
            cache,
            hub,
            notices: Arc::new(NoticeCenter::new()),
            config,
            pipeline,
        }
    }

    pub fn with_document(id: &str, title: &str, abilities: Abilities) -> Self {
        let fixture = Self::new();
        fixture.api.insert(Document::new(id, title, abilities));
        fixture
    }
}
