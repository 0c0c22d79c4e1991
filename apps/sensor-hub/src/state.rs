use crate::config::HubConfig;
use crate::history::HistoryService;
use crate::ingest::IngestService;
use crate::live::SessionRegistry;
use crate::store::StoreHandle;
use axum::extract::FromRef;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub config: HubConfig,
    pub store: StoreHandle,
    pub ingest: Arc<IngestService>,
    pub history: Arc<HistoryService>,
    pub sessions: Arc<SessionRegistry>,
    /// Cancelled on shutdown so long-lived viewer connections let go.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: HubConfig,
        store: StoreHandle,
        sessions: Arc<SessionRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        let ingest = Arc::new(IngestService::new(
            store.clone(),
            config.device_classes.clone(),
        ));
        let history = Arc::new(HistoryService::new(store.clone(), config.table_rows));
        Self {
            config,
            store,
            ingest,
            history,
            sessions,
            shutdown,
        }
    }
}

impl FromRef<AppState> for Arc<SessionRegistry> {
    fn from_ref(state: &AppState) -> Arc<SessionRegistry> {
        state.sessions.clone()
    }
}

impl FromRef<AppState> for StoreHandle {
    fn from_ref(state: &AppState) -> StoreHandle {
        state.store.clone()
    }
}
