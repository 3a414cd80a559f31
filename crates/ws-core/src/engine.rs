//! Explicit wiring of the engine services.

use std::sync::Arc;

use tracing::info;
use ws_executor::{ExecutorProvider, RepoLayout};
use ws_snapshots::{GitSnapshotProvider, SnapshotProvider};

use crate::config::EngineConfig;
use crate::db::DatabaseManager;
use crate::events::EventPublisher;
use crate::provision::Provisioner;
use crate::snapshotter::Snapshotter;
use crate::sync::SyncService;
use crate::view_open::ViewAttachment;
use crate::Result;

pub struct Engine {
    config: EngineConfig,
    db: DatabaseManager,
    executors: Arc<ExecutorProvider>,
    snapshotter: Arc<Snapshotter>,
    events: EventPublisher,
    sync: SyncService,
    views: ViewAttachment,
    provisioner: Provisioner,
}

impl Engine {
    /// Open the database named by `config` and wire the services with the
    /// git snapshot provider.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let db = DatabaseManager::with_path(&config.database_path)?;
        Ok(Self::with_parts(config, db, Arc::new(GitSnapshotProvider::new())))
    }

    pub fn with_parts(
        config: EngineConfig,
        db: DatabaseManager,
        snapshot_provider: Arc<dyn SnapshotProvider>,
    ) -> Self {
        let executors = Arc::new(ExecutorProvider::new(
            RepoLayout::new(&config.repos_base_path),
            Some(config.identity()),
        ));
        let events = EventPublisher::new(config.event_queue_capacity);
        let snapshotter = Arc::new(Snapshotter::new(
            db.clone(),
            executors.clone(),
            snapshot_provider,
        ));

        let sync = SyncService::new(
            db.clone(),
            executors.clone(),
            snapshotter.clone(),
            events.clone(),
            config.trunk_branch.clone(),
        );
        let views = ViewAttachment::new(
            db.clone(),
            executors.clone(),
            snapshotter.clone(),
            events.clone(),
        );
        let provisioner = Provisioner::new(db.clone(), executors.clone(), config.trunk_branch.clone());

        info!(
            home = %config.home.display(),
            repos = %config.repos_base_path.display(),
            "engine ready"
        );

        Self {
            config,
            db,
            executors,
            snapshotter,
            events,
            sync,
            views,
            provisioner,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn db(&self) -> &DatabaseManager {
        &self.db
    }

    pub fn executors(&self) -> &ExecutorProvider {
        &self.executors
    }

    pub fn snapshotter(&self) -> &Snapshotter {
        &self.snapshotter
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn sync(&self) -> &SyncService {
        &self.sync
    }

    pub fn views(&self) -> &ViewAttachment {
        &self.views
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }
}
