//! Database schema definitions and constants.

// Current schema version
pub const SCHEMA_VERSION: u32 = 1;

// Table names
pub const TABLE_SCHEMA_MIGRATIONS: &str = "schema_migrations";
pub const TABLE_CODEBASES: &str = "codebases";
pub const TABLE_WORKSPACES: &str = "workspaces";
pub const TABLE_VIEWS: &str = "views";
pub const TABLE_SNAPSHOTS: &str = "snapshots";

/// Every table created by the migrations, in creation order.
pub const ALL_TABLES: &[&str] = &[
    TABLE_SCHEMA_MIGRATIONS,
    TABLE_CODEBASES,
    TABLE_WORKSPACES,
    TABLE_VIEWS,
    TABLE_SNAPSHOTS,
];
