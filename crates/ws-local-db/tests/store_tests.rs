use ws_local_db::{
    now_timestamp, CodebaseRecord, CodebaseStore, Database, SnapshotRecord, SnapshotStore,
    ViewRecord, ViewStore, WorkspaceRecord, WorkspaceStore,
};

fn seed(db: &Database) {
    db.with_conn(|conn| {
        CodebaseStore::new(conn).insert(&CodebaseRecord {
            id: "c1".to_string(),
            name: "demo".to_string(),
            created_at: now_timestamp(),
            archived_at: None,
        })?;
        WorkspaceStore::new(conn).insert(&workspace("w1"))?;
        WorkspaceStore::new(conn).insert(&workspace("w2"))?;
        ViewStore::new(conn).insert(&ViewRecord {
            id: "v1".to_string(),
            codebase_id: "c1".to_string(),
            user_id: "alice".to_string(),
            workspace_id: None,
            mount_path: Some("/home/alice/demo".to_string()),
            mount_hostname: Some("laptop".to_string()),
            created_at: now_timestamp(),
            last_used_at: None,
        })
    })
    .unwrap();
}

fn workspace(id: &str) -> WorkspaceRecord {
    let now = now_timestamp();
    WorkspaceRecord {
        id: id.to_string(),
        codebase_id: "c1".to_string(),
        user_id: "alice".to_string(),
        name: format!("workspace {}", id),
        view_id: None,
        latest_snapshot_id: None,
        created_at: now.clone(),
        updated_at: now,
        archived_at: None,
    }
}

fn snapshot(id: &str, previous: Option<&str>) -> SnapshotRecord {
    SnapshotRecord {
        id: id.to_string(),
        codebase_id: "c1".to_string(),
        workspace_id: "w1".to_string(),
        view_id: Some("v1".to_string()),
        commit_id: format!("{:0>40}", id),
        action: "manual".to_string(),
        previous_snapshot_id: previous.map(str::to_string),
        created_at: now_timestamp(),
        deleted_at: None,
    }
}

#[test]
fn test_codebase_roundtrip_and_missing() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);

    db.with_conn(|conn| {
        let store = CodebaseStore::new(conn);
        assert_eq!(store.get("c1")?.unwrap().name, "demo");
        assert!(store.get("nope")?.is_none());
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_workspace_view_pointers() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);

    db.transaction(|conn| {
        WorkspaceStore::new(conn).set_view_id("w1", Some("v1"))?;
        ViewStore::new(conn).set_workspace_id("v1", Some("w1"))
    })
    .unwrap();

    db.with_conn(|conn| {
        let workspaces = WorkspaceStore::new(conn);
        assert_eq!(workspaces.get_by_view_id("v1")?.unwrap().id, "w1");
        assert_eq!(
            ViewStore::new(conn).get("v1")?.unwrap().workspace_id.as_deref(),
            Some("w1")
        );

        workspaces.set_view_id("w1", None)?;
        assert!(workspaces.get_by_view_id("v1")?.is_none());
        assert_eq!(workspaces.list_by_codebase("c1")?.len(), 2);
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_updates_on_missing_rows_fail() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);

    let result = db.with_conn(|conn| WorkspaceStore::new(conn).mark_updated("missing"));
    assert!(result.is_err());
    let result = db.with_conn(|conn| ViewStore::new(conn).set_workspace_id("missing", None));
    assert!(result.is_err());
}

#[test]
fn test_archive_detaches_workspace() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);

    db.with_conn(|conn| {
        let store = WorkspaceStore::new(conn);
        store.set_view_id("w1", Some("v1"))?;
        store.archive("w1")?;

        let archived = store.get("w1")?.unwrap();
        assert!(archived.is_archived());
        assert!(archived.view_id.is_none());
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_snapshot_chain_order() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);

    db.with_conn(|conn| {
        let store = SnapshotStore::new(conn);
        store.insert(&snapshot("s1", None))?;
        store.insert(&snapshot("s2", Some("s1")))?;
        store.insert(&snapshot("s3", Some("s2")))?;

        let ids: Vec<String> = store
            .list_by_workspace("w1")?
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["s1", "s2", "s3"]);

        let latest = store.latest_in_workspace("w1")?.unwrap();
        assert_eq!(latest.id, "s3");
        assert_eq!(latest.previous_snapshot_id.as_deref(), Some("s2"));
        assert!(store.latest_in_workspace("w2")?.is_none());

        WorkspaceStore::new(conn).set_latest_snapshot_id("w1", "s3")?;
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_open_file_database_creates_parent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("state.db");

    let db = Database::open(&path).unwrap();
    seed(&db);
    drop(db);

    let reopened = Database::open(&path).unwrap();
    let codebase = reopened
        .with_conn(|conn| CodebaseStore::new(conn).get("c1"))
        .unwrap();
    assert!(codebase.is_some());
}
