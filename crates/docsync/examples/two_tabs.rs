use docsync::bridge::BridgeSynchronizer;
use docsync::memory::{MemoryDocumentApi, MemorySharedDocument, RecordingBridge, StaticEditor};
use docsync::{
    logging, Abilities, BroadcastHub, CollaborativeSession, Document, DocumentView,
    MutationPipeline, NoticeCenter, ProviderStatus, QueryCache, SyncConfig, SyncResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, Level};

fn tab(
    api: &Arc<MemoryDocumentApi>,
    bridge: &Arc<RecordingBridge>,
    hub: &Arc<BroadcastHub>,
    config: &SyncConfig,
) -> MutationPipeline {
    MutationPipeline::new(
        api.clone(),
        Arc::new(QueryCache::new()),
        BridgeSynchronizer::new(bridge.clone()),
        hub.clone(),
        config,
    )
}

#[tokio::main]
async fn main() -> SyncResult<()> {
    logging::init(Level::INFO);

    let config = SyncConfig {
        autosave_interval_ms: 200,
        ..SyncConfig::default()
    };
    let api = Arc::new(MemoryDocumentApi::new());
    let bridge = Arc::new(RecordingBridge::new());
    let hub = Arc::new(BroadcastHub::new(config.broadcast_capacity));
    let notices = Arc::new(NoticeCenter::new());
    let document = Document::new("42", "Meeting notes", Abilities::owner());
    api.insert(document.clone());

    let mut notice_rx = notices.subscribe();
    tokio::spawn(async move {
        while let Ok(notice) = notice_rx.recv().await {
            info!("[{:?}] {} {:?}", notice.level, notice.message, notice.causes);
        }
    });

    let mut left = DocumentView::open(
        document.clone(),
        tab(&api, &bridge, &hub, &config),
        notices.clone(),
        &config,
    );
    let mut right = DocumentView::open(
        document,
        tab(&api, &bridge, &hub, &config),
        notices.clone(),
        &config,
    );

    let shared = Arc::new(MemorySharedDocument::new());
    let (status_tx, status_rx) = watch::channel(ProviderStatus::connecting());
    let _lease = left.attach_editor(Arc::new(StaticEditor::new(
        vec![(1, "Agenda"), (2, "Decisions")],
        "# Agenda\n\n## Decisions",
    )));
    left.bind_session(CollaborativeSession::open("42", shared.clone(), status_rx))
        .await;
    info!("Left tab editable while connecting: {}", left.editable());
    status_tx.send_replace(ProviderStatus::ready());
    info!("Left tab editable once synced: {}", left.editable());

    left.title().input("Weekly sync");
    left.title().commit("  Weekly sync\n").await?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    info!("Right tab now shows '{}'", right.title().display_label());

    shared.edit_local("AAEC");
    tokio::time::sleep(Duration::from_millis(300)).await;

    left.close().await;
    right.close().await;

    for call in bridge.calls() {
        info!("Host received {:?}", call);
    }
    Ok(())
}
