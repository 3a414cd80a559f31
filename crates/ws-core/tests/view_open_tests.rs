mod common;

use common::{current_branch, head_of, read, write, Fixture};
use ws_core::{Error, EventType, Topic};
use ws_repo::test_helpers::{git_available, git_status};

#[test]
fn test_hand_off_preserves_uncommitted_state() {
    if !git_available() {
        eprintln!("Git not available, skipping test");
        return;
    }

    let fx = Fixture::new(&[("README.md", "hello\n")]);
    let (a, view, path) = fx.open_workspace("alice");
    let b = fx.workspace("alice");
    let a_head = fx.branch_head(&a.id);

    write(&path, "a.txt", "AA");
    fx.engine
        .views()
        .open_workspace_on_view(&view.id, &b.id)
        .unwrap();
    assert_eq!(current_branch(&path), b.id);
    assert!(!path.join("a.txt").exists());

    write(&path, "b.txt", "BB");
    let reopened = fx
        .engine
        .views()
        .open_workspace_on_view(&view.id, &a.id)
        .unwrap();

    assert_eq!(reopened.workspace_id.as_deref(), Some(a.id.as_str()));
    assert_eq!(read(&path, "a.txt"), "AA");
    assert!(!path.join("b.txt").exists());
    assert_eq!(current_branch(&path), a.id);
    assert_eq!(head_of(&path), a_head);
    assert_eq!(fx.branch_head(&a.id), a_head);

    let b = fx.engine.db().workspace(&b.id).unwrap();
    assert!(b.view_id.is_none());
    let b_latest = fx.engine.db().latest_snapshot(&b).unwrap().unwrap();
    assert_eq!(b_latest.action, "pre_checkout_other_workspace");
}

#[test]
fn test_move_between_views_of_same_user() {
    if !git_available() {
        eprintln!("Git not available, skipping test");
        return;
    }

    let fx = Fixture::new(&[("README.md", "hello\n")]);
    let (workspace, first, first_path) = fx.open_workspace("alice");
    write(&first_path, "draft.txt", "draft\n");
    write(&first_path, "README.md", "edited\n");

    let second = fx.view("alice");
    let second = fx
        .engine
        .views()
        .open_workspace_on_view(&second.id, &workspace.id)
        .unwrap();
    let second_path = fx.view_path(&second);

    assert_eq!(read(&second_path, "draft.txt"), "draft\n");
    assert_eq!(read(&second_path, "README.md"), "edited\n");
    assert_eq!(current_branch(&second_path), workspace.id);
    assert!(git_status(&second_path).unwrap().contains("README.md"));

    let workspace = fx.engine.db().workspace(&workspace.id).unwrap();
    assert_eq!(workspace.view_id.as_deref(), Some(second.id.as_str()));
    assert!(fx.engine.db().view(&first.id).unwrap().workspace_id.is_none());
    let latest = fx.engine.db().latest_snapshot(&workspace).unwrap().unwrap();
    assert_eq!(latest.action, "pre_checkout_other_view");
    assert_eq!(latest.view_id.as_deref(), Some(first.id.as_str()));
}

#[test]
fn test_copy_to_other_users_view() {
    if !git_available() {
        eprintln!("Git not available, skipping test");
        return;
    }

    let fx = Fixture::new(&[("README.md", "hello\n")]);
    let (workspace, home_view, home_path) = fx.open_workspace("alice");
    write(&home_path, "draft.txt", "draft\n");

    let review = fx.view("bob");
    let review = fx
        .engine
        .views()
        .open_workspace_on_view(&review.id, &workspace.id)
        .unwrap();

    assert_eq!(read(&fx.view_path(&review), "draft.txt"), "draft\n");
    assert_eq!(review.workspace_id.as_deref(), Some(workspace.id.as_str()));

    let workspace = fx.engine.db().workspace(&workspace.id).unwrap();
    assert_eq!(workspace.view_id.as_deref(), Some(home_view.id.as_str()));
    assert_eq!(workspace.user_id, "alice");
    assert_eq!(
        fx.engine.db().view(&home_view.id).unwrap().workspace_id.as_deref(),
        Some(workspace.id.as_str())
    );
    assert_eq!(read(&home_path, "draft.txt"), "draft\n");
}

#[test]
fn test_leaving_a_copy_keeps_owner_edits() {
    if !git_available() {
        eprintln!("Git not available, skipping test");
        return;
    }

    let fx = Fixture::new(&[("README.md", "hello\n")]);
    let (workspace, home_view, home_path) = fx.open_workspace("alice");
    write(&home_path, "owner.txt", "alice-work\n");

    let review = fx.view("bob");
    fx.engine
        .views()
        .open_workspace_on_view(&review.id, &workspace.id)
        .unwrap();
    let review_path = fx.view_path(&review);
    write(&review_path, "owner.txt", "bob-scribble\n");

    let other = fx.workspace("alice");
    fx.engine
        .views()
        .open_workspace_on_view(&home_view.id, &other.id)
        .unwrap();
    let bobs_own = fx.workspace("bob");
    fx.engine
        .views()
        .open_workspace_on_view(&review.id, &bobs_own.id)
        .unwrap();

    let record = fx.engine.db().workspace(&workspace.id).unwrap();
    let latest = fx.engine.db().latest_snapshot(&record).unwrap().unwrap();
    assert_eq!(latest.view_id.as_deref(), Some(home_view.id.as_str()));
    let history = fx.engine.db().list_snapshots(&workspace.id).unwrap();
    assert!(history
        .iter()
        .any(|s| s.view_id.as_deref() == Some(review.id.as_str())));

    fx.engine
        .views()
        .open_workspace_on_view(&home_view.id, &workspace.id)
        .unwrap();
    assert_eq!(read(&home_path, "owner.txt"), "alice-work\n");
}

#[test]
fn test_reopen_is_noop() {
    if !git_available() {
        eprintln!("Git not available, skipping test");
        return;
    }

    let fx = Fixture::new(&[]);
    let (workspace, view, path) = fx.open_workspace("alice");
    write(&path, "draft.txt", "draft\n");

    let again = fx
        .engine
        .views()
        .open_workspace_on_view(&view.id, &workspace.id)
        .unwrap();

    assert_eq!(again.workspace_id.as_deref(), Some(workspace.id.as_str()));
    assert_eq!(read(&path, "draft.txt"), "draft\n");
    assert!(fx.engine.db().list_snapshots(&workspace.id).unwrap().is_empty());
}

#[test]
fn test_open_refused_while_view_is_rebasing() {
    if !git_available() {
        eprintln!("Git not available, skipping test");
        return;
    }

    let fx = Fixture::new(&[("foo.txt", "history\n")]);
    let (workspace, view, path) = fx.open_workspace("alice");
    fx.commit_on_trunk("trunk edit", |c| write(c, "foo.txt", "trunk\n"));
    write(&path, "foo.txt", "mine\n");
    assert!(fx.engine.sync().on_trunk(&workspace.id).unwrap().have_conflicts);

    let other = fx.workspace("alice");
    let err = fx
        .engine
        .views()
        .open_workspace_on_view(&view.id, &other.id)
        .unwrap_err();
    assert!(matches!(err, Error::Rebasing));

    assert_eq!(
        fx.engine.db().view(&view.id).unwrap().workspace_id.as_deref(),
        Some(workspace.id.as_str())
    );
    assert!(fx.engine.sync().view_status(&view.id).unwrap().have_conflicts);
}

#[test]
fn test_open_validation() {
    if !git_available() {
        eprintln!("Git not available, skipping test");
        return;
    }

    let fx = Fixture::new(&[]);
    let view = fx.view("alice");

    let archived = fx.workspace("alice");
    fx.engine
        .provisioner()
        .archive_workspace(&archived.id)
        .unwrap();
    assert!(matches!(
        fx.engine.views().open_workspace_on_view(&view.id, &archived.id),
        Err(Error::Archived { .. })
    ));

    let elsewhere = fx
        .engine
        .provisioner()
        .create_codebase("other", None)
        .unwrap();
    let foreign = fx
        .engine
        .provisioner()
        .create_workspace(&elsewhere.id, "alice", None)
        .unwrap();
    assert!(matches!(
        fx.engine.views().open_workspace_on_view(&view.id, &foreign.id),
        Err(Error::CodebaseMismatch { .. })
    ));

    assert!(matches!(
        fx.engine.views().open_workspace_on_view("missing", &archived.id),
        Err(Error::NotFound { kind: "view", .. })
    ));
}

#[test]
fn test_open_publishes_view_update() {
    if !git_available() {
        eprintln!("Git not available, skipping test");
        return;
    }

    let fx = Fixture::new(&[]);
    let workspace = fx.workspace("alice");
    let view = fx.view("alice");
    let mut events = fx
        .engine
        .events()
        .subscribe(Some(Topic::Codebase(fx.codebase.id.clone())));

    let opened = fx
        .engine
        .views()
        .open_workspace_on_view(&view.id, &workspace.id)
        .unwrap();

    assert!(opened.last_used_at.is_some());
    let event = events.try_recv().unwrap();
    assert_eq!(event.event_type, EventType::ViewUpdated);
    assert_eq!(event.reference_id, view.id);
}
