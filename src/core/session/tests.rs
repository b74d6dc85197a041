use super::*;
use crate::core::validator::RejectReason;
use crate::utils::test_utils::test_validator;
use std::fs;
use tempfile::{tempdir, TempDir};

fn open_store(dir: &TempDir, settings: StoreSettings) -> SessionStore {
    SessionStore::open(
        dir.path().join("chat_history.json"),
        test_validator(dir.path()),
        settings,
    )
    .expect("store opens")
}

fn conversation(store: &mut SessionStore, turns: usize) {
    for turn in 0..turns {
        store
            .append(Role::User, &format!("question {turn}"), "")
            .expect("append user");
        store
            .append(Role::Assistant, &format!("answer {turn}"), "llama2:7b")
            .expect("append assistant");
    }
}

#[test]
fn saved_sessions_survive_a_reload() {
    let dir = tempdir().expect("tempdir");
    let mut store = open_store(&dir, StoreSettings::default());
    conversation(&mut store, 3);
    let expected: Vec<(Role, String)> = store
        .current()
        .iter()
        .map(|m| (m.role, m.content.clone()))
        .collect();

    let index = store.save(Some("Geography")).expect("saved");
    assert!(store.is_durable());
    drop(store);

    let reopened = open_store(&dir, StoreSettings::default());
    let session = &reopened.history()[index];
    assert_eq!(session.title, "Geography");
    let actual: Vec<(Role, String)> = session
        .messages
        .iter()
        .map(|m| (m.role, m.content.clone()))
        .collect();
    assert_eq!(actual, expected);
    assert_eq!(session.messages[1].model, "llama2:7b");
}

#[test]
fn save_moves_the_open_session_into_history() {
    let dir = tempdir().expect("tempdir");
    let mut store = open_store(&dir, StoreSettings::default());
    assert!(matches!(store.save(None), Err(StoreError::EmptySession)));

    conversation(&mut store, 1);
    let index = store.save(Some("   ")).expect("saved");
    assert_eq!(index, 0);
    assert!(store.current().is_empty());
    assert!(store.history()[0].title.starts_with("Chat 20"));
}

#[test]
fn loading_copies_messages_out_of_history() {
    let dir = tempdir().expect("tempdir");
    let mut store = open_store(&dir, StoreSettings::default());
    conversation(&mut store, 2);
    store.save(None).expect("saved");

    store.load(0).expect("loads");
    assert_eq!(store.current().len(), 4);
    store
        .append(Role::User, "a follow-up", "")
        .expect("append");
    assert_eq!(store.current().len(), 5);
    assert_eq!(store.history()[0].messages.len(), 4);

    assert!(matches!(store.load(7), Err(StoreError::NoSuchSession(7))));
}

#[test]
fn new_session_autosaves_only_when_enabled() {
    let dir = tempdir().expect("tempdir");
    let mut store = open_store(&dir, StoreSettings::default());
    conversation(&mut store, 1);
    assert_eq!(store.start_new_session().expect("new session"), Some(0));
    assert!(store.current().is_empty());
    assert_eq!(store.history().len(), 1);
    assert_eq!(store.start_new_session().expect("nothing to save"), None);

    let other = tempdir().expect("tempdir");
    let mut store = open_store(
        &other,
        StoreSettings {
            auto_save: false,
            ..StoreSettings::default()
        },
    );
    conversation(&mut store, 1);
    assert_eq!(store.start_new_session().expect("new session"), None);
    assert!(store.current().is_empty());
    assert!(store.history().is_empty());
}

#[test]
fn append_validates_user_text_and_sanitizes_replies() {
    let dir = tempdir().expect("tempdir");
    let mut store = open_store(&dir, StoreSettings::default());

    assert!(!store.append(Role::User, "   \n", "").expect("blank"));
    match store.append(Role::User, "<script>alert(1)</script>", "") {
        Err(StoreError::Invalid(err)) => assert_eq!(err.reason, RejectReason::DangerousPattern),
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert!(store
        .append(Role::Assistant, "Use <b>bold</b>\u{0007} text", "llama2")
        .expect("sanitized"));
    assert!(!store.append(Role::Assistant, "\u{0000}\u{0008}", "llama2").expect("blank"));

    assert_eq!(store.current().len(), 1);
    assert_eq!(store.current()[0].content, "Use <b>bold</b> text");
}

#[test]
fn max_history_evicts_oldest_on_save_and_on_open() {
    let dir = tempdir().expect("tempdir");
    let unbounded = StoreSettings {
        auto_save: true,
        max_history: None,
    };
    let mut store = open_store(&dir, unbounded);
    for n in 0..4 {
        conversation(&mut store, 1);
        store.save(Some(&format!("session {n}"))).expect("saved");
    }
    assert_eq!(store.history().len(), 4);
    drop(store);

    let capped = StoreSettings {
        auto_save: true,
        max_history: Some(2),
    };
    let mut store = open_store(&dir, capped);
    let titles: Vec<_> = store.history().iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, ["session 2", "session 3"]);

    conversation(&mut store, 1);
    let index = store.save(Some("session 4")).expect("saved");
    assert_eq!(index, 1);
    let titles: Vec<_> = store.history().iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, ["session 3", "session 4"]);

    let on_disk = io::read_history(store.history_path()).expect("readable");
    assert_eq!(on_disk.len(), 2);
}

#[test]
fn failed_rewrite_keeps_session_and_flags_store() {
    let dir = tempdir().expect("tempdir");
    let blocker = dir.path().join("state");
    let mut store = SessionStore::open(
        blocker.join("chat_history.json"),
        test_validator(dir.path()),
        StoreSettings::default(),
    )
    .expect("missing document is an empty history");

    fs::write(&blocker, "not a directory").expect("blocker file");
    conversation(&mut store, 1);

    let err = store.save(Some("unsaved")).expect_err("rewrite fails");
    assert!(matches!(err, StoreError::Persistence(_)));
    assert_eq!(store.history().len(), 1);
    assert!(!store.is_durable());

    fs::remove_file(&blocker).expect("remove blocker");
    store.flush().expect("retry succeeds");
    assert!(store.is_durable());
    let on_disk = io::read_history(store.history_path()).expect("readable");
    assert_eq!(on_disk[0].title, "unsaved");
}

#[test]
fn corrupt_document_is_moved_aside() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("chat_history.json");
    fs::write(&path, "{ this is not json").expect("write corrupt");

    let store = open_store(&dir, StoreSettings::default());
    assert!(store.history().is_empty());
    assert!(!path.exists());
    assert_eq!(
        fs::read_to_string(dir.path().join("chat_history.json.corrupt")).expect("kept"),
        "{ this is not json"
    );
}

#[test]
fn documents_from_older_versions_load() {
    let dir = tempdir().expect("tempdir");
    fs::write(
        dir.path().join("chat_history.json"),
        r#"[{"title": "Chat 2024-11-02 18:04", "timestamp": "2024-11-02T18:04:51.918273",
            "messages": [
              {"role": "user", "content": "Hello", "timestamp": "2024-11-02T18:04:10.000001", "model": ""},
              {"role": "assistant", "content": "Hi!", "timestamp": "2024-11-02T18:04:12.5", "model": "llama2"}
            ]}]"#,
    )
    .expect("write document");

    let store = open_store(&dir, StoreSettings::default());
    assert_eq!(
        store.summaries(),
        vec![SessionSummary {
            index: 0,
            title: "Chat 2024-11-02 18:04".into(),
            date: "2024-11-02 18:04".into(),
            message_count: 2,
        }]
    );
}

#[test]
fn exports_stay_inside_the_storage_root() {
    let dir = tempdir().expect("tempdir");
    let mut store = open_store(&dir, StoreSettings::default());
    conversation(&mut store, 1);

    let written = store
        .export("notes/today.md", ExportSource::Current)
        .expect("exported");
    assert!(written.ends_with("exports/notes/today.md"));
    let text = fs::read_to_string(&written).expect("readable");
    assert!(text.starts_with("# Current Session\nDate: "));
    assert!(text.contains("**User**: question 0\n\n**Assistant**: answer 0\n\n"));

    store.save(Some("Saved")).expect("saved");
    let json_path = store
        .export("saved.json", ExportSource::History(0))
        .expect("exported");
    let session: Session =
        serde_json::from_str(&fs::read_to_string(json_path).expect("readable")).expect("json");
    assert_eq!(session.title, "Saved");

    for target in ["../escape.md", "/etc/passwd", ""] {
        match store.export(target, ExportSource::History(0)) {
            Err(StoreError::Invalid(_)) => {}
            other => panic!("{target:?} should be rejected, got {other:?}"),
        }
    }
    assert!(matches!(
        store.export("x.md", ExportSource::History(3)),
        Err(StoreError::NoSuchSession(3))
    ));
    assert!(matches!(
        store.export("x.md", ExportSource::Current),
        Err(StoreError::EmptySession)
    ));
}

#[test]
fn clear_rewrites_an_empty_document() {
    let dir = tempdir().expect("tempdir");
    let mut store = open_store(&dir, StoreSettings::default());
    conversation(&mut store, 1);
    store.save(None).expect("saved");

    store.clear().expect("cleared");
    assert!(store.history().is_empty());
    let raw = fs::read_to_string(store.history_path()).expect("document exists");
    assert_eq!(raw.trim(), "[]");
}

#[test]
fn transport_projection_skips_system_notes() {
    let dir = tempdir().expect("tempdir");
    let mut store = open_store(&dir, StoreSettings::default());
    store
        .append(Role::System, "Switched to llama2", "")
        .expect("append");
    conversation(&mut store, 1);

    let projected = store.project_for_transport();
    let pairs: Vec<_> = projected
        .iter()
        .map(|m| (m.role.as_str(), m.content.as_str()))
        .collect();
    assert_eq!(
        pairs,
        [("user", "question 0"), ("assistant", "answer 0")]
    );
}
