use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::live::{spawn_fanout, SessionRegistry};
use crate::state::AppState;
use crate::store::StoreHandle;

/// A fully wired hub over a throwaway database.
pub struct TestHub {
    pub state: AppState,
    _dir: TempDir,
}

impl TestHub {
    pub fn database_path(&self) -> &Path {
        self.state.store.path()
    }

    pub fn router(&self) -> axum::Router {
        crate::routes::router(self.state.clone())
    }
}

impl Drop for TestHub {
    fn drop(&mut self) {
        self.state.shutdown.cancel();
    }
}

pub fn test_config(database_path: &Path) -> HubConfig {
    HubConfig::from_source(&|_: &str| None, Some(database_path.to_path_buf()), None)
        .expect("default config is valid")
}

pub fn test_hub() -> TestHub {
    test_hub_with(|_| {})
}

pub fn test_hub_with(customize: impl FnOnce(&mut HubConfig)) -> TestHub {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(&dir.path().join("sensor_data.db"));
    customize(&mut config);

    let (store, commits) = StoreHandle::open(config.store_options()).expect("open store");
    let sessions = Arc::new(SessionRegistry::new(config.session_queue_capacity));
    let shutdown = CancellationToken::new();
    spawn_fanout(sessions.clone(), commits, shutdown.clone());
    let state = AppState::new(config, store, sessions, shutdown);
    TestHub { state, _dir: dir }
}
