//! Workspace synchronization engine.
//!
//! Keeps each workspace's working directory up to date with its codebase's
//! trunk, walks users through rebase conflicts, and moves working
//! directories between views without losing uncommitted edits.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod events;
pub mod provision;
pub mod snapshotter;
pub mod sync;
pub mod unidiff;
pub mod view_open;

/// Core result type used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

pub use error::{Error, GitContext};

pub use config::EngineConfig;
pub use db::DatabaseManager;
pub use engine::Engine;
pub use events::{Event, EventPublisher, EventType, Subscription, Topic};
pub use provision::Provisioner;
pub use snapshotter::{SnapshotAction, SnapshotOptions, Snapshotter};
pub use sync::{
    ConflictingFile, FileResolution, RebaseStatus, Resolution, SyncService, UNSAVED_COMMIT_MESSAGE,
};
pub use unidiff::{FileDiff, Hunk};
pub use view_open::{AttachMode, ViewAttachment};
