//! End-to-end sync: a real server library, CBOR over an in-process channel,
//! and client mirrors converging on it.

use proptest::prelude::*;
use std::sync::Arc;
use wisdom_core::{DocumentWrite, Library, NewBacklink};
use wisdom_sync_engine::{
    ChannelTransport, MemoryMirror, MessageChannel, Mirror, MirrorDocument, RetryConfig,
    SqliteMirror, SyncConfig, SyncEngine, SyncError, SyncResult,
};
use wisdom_sync_server::{ServerConfig, SyncServer};

struct Loopback {
    server: Arc<SyncServer>,
}

impl MessageChannel for Loopback {
    fn exchange(&self, body: Vec<u8>) -> SyncResult<Vec<u8>> {
        self.server.handle_bytes(&body).map_err(|e| {
            if e.is_client_error() {
                SyncError::Protocol(e.to_string())
            } else {
                SyncError::ServerError(e.to_string())
            }
        })
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

fn server(config: ServerConfig) -> Arc<SyncServer> {
    Arc::new(SyncServer::new(config, Library::open_in_memory().unwrap()))
}

fn client<M: Mirror>(
    server: &Arc<SyncServer>,
    mirror: M,
    batch: u32,
) -> SyncEngine<ChannelTransport<Loopback>, M> {
    let transport = ChannelTransport::new(Loopback {
        server: Arc::clone(server),
    });
    let config = SyncConfig::new("laptop")
        .with_pull_batch_size(batch)
        .with_retry(RetryConfig::no_retry());
    SyncEngine::new(config, transport, mirror)
}

fn markdown(path: &str, content: &str) -> DocumentWrite {
    DocumentWrite::new(path, "markdown", content)
}

/// What the mirror should hold: every live server document.
fn expected(library: &Library) -> Vec<(String, String, String, i64)> {
    let mut docs: Vec<_> = library
        .documents()
        .unwrap()
        .into_iter()
        .map(|d| (d.relative_path, d.doc_id.to_string(), d.adapter, d.updated_at))
        .collect();
    docs.sort();
    docs
}

fn mirrored(mirror: &impl Mirror) -> Vec<(String, String, String, i64)> {
    let mut docs: Vec<_> = mirror
        .documents()
        .unwrap()
        .into_iter()
        .map(|d: MirrorDocument| (d.relative_path, d.doc_id, d.adapter, d.updated_at))
        .collect();
    docs.sort();
    docs
}

#[test]
fn mirror_converges_on_server_state() {
    let server = server(ServerConfig::default());
    let library = server.library();
    let a = library.write_document(markdown("a.md", "a")).unwrap();
    library.write_document(markdown("b.md", "b")).unwrap();
    library.write_document(markdown("a.md", "a2")).unwrap();
    library.delete_document(&a.doc_id).unwrap();
    library.write_document(markdown("c.md", "c")).unwrap();

    let engine = client(&server, MemoryMirror::new(), 2);
    let result = engine.sync().unwrap();

    assert_eq!(result.cursor, library.head().unwrap());
    assert_eq!(result.batches, 3);
    assert_eq!(mirrored(engine.mirror()), expected(library));
    assert!(engine.mirror().is_deleted(&a.doc_id.to_string()).unwrap());
    assert_eq!(server.session("laptop").unwrap().acked_cursor, Some(5));
}

#[test]
fn second_sync_pulls_only_new_events() {
    let server = server(ServerConfig::default());
    let library = server.library();
    library.write_document(markdown("a.md", "a")).unwrap();

    let engine = client(&server, MemoryMirror::new(), 100);
    engine.sync().unwrap();

    library.write_document(markdown("a.md", "changed")).unwrap();
    library.write_document(markdown("b.md", "b")).unwrap();

    let result = engine.sync().unwrap();
    assert_eq!(result.pulled, 2);
    assert_eq!(result.applied, 2);
    assert_eq!(result.skipped, 0);
    assert_eq!(mirrored(engine.mirror()), expected(library));

    // Nothing new: one empty round trip.
    let idle = engine.sync().unwrap();
    assert_eq!(idle.pulled, 0);
    assert_eq!(idle.cursor, 3);
    assert_eq!(engine.stats().cycles_completed, 3);
}

#[test]
fn replaying_the_whole_log_changes_nothing() {
    let server = server(ServerConfig::default());
    let library = server.library();
    let a = library.write_document(markdown("a.md", "a")).unwrap();
    library.write_document(markdown("b.md", "b")).unwrap();
    library.delete_document(&a.doc_id).unwrap();

    let mirror = SqliteMirror::open_in_memory().unwrap();
    let events = library.events_since(0, 100).unwrap();
    mirror.apply(&events).unwrap();
    let once = mirrored(&mirror);

    let outcome = mirror.apply(&events).unwrap();
    assert_eq!(outcome.skipped, events.len() as u64);
    assert_eq!(outcome.applied, 0);
    assert_eq!(mirrored(&mirror), once);
    assert_eq!(mirror.cursor().unwrap(), 3);
}

/// Moves a mirror's cursor back without touching its rows, as a crash
/// between applying a batch and committing the cursor would.
fn rewind_cursor(path: &std::path::Path, cursor: i64) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute(
        "UPDATE local_sync_state SET last_cursor = ?1 WHERE id = 1",
        [cursor],
    )
    .unwrap();
}

/// A log with updates, a delete, a re-created path and backlink churn.
fn busy_library(library: &Library) -> String {
    let old = library.write_document(markdown("a.md", "a")).unwrap();
    let b = library.write_document(markdown("b.md", "b")).unwrap();
    library.write_document(markdown("a.md", "a2")).unwrap();
    library
        .set_backlinks(&b.doc_id, &[NewBacklink::to(old.doc_id, "a")])
        .unwrap();
    library.delete_document(&old.doc_id).unwrap();
    let again = library.write_document(markdown("a.md", "reborn")).unwrap();
    library
        .set_backlinks(&b.doc_id, &[NewBacklink::to(again.doc_id, "a")])
        .unwrap();
    library.write_document(markdown("b.md", "b2")).unwrap();
    old.doc_id.to_string()
}

#[test]
fn full_log_replayed_from_zero_onto_populated_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.db");
    let server = server(ServerConfig::default());
    let library = server.library();
    let old_id = busy_library(library);
    let head = library.head().unwrap();

    {
        let engine = client(&server, SqliteMirror::open(&path).unwrap(), 3);
        engine.sync().unwrap();
    }
    let synced = mirrored(&SqliteMirror::open(&path).unwrap());
    assert_eq!(synced, expected(library));

    rewind_cursor(&path, 0);
    let mirror = SqliteMirror::open(&path).unwrap();
    assert_eq!(mirror.cursor().unwrap(), 0);

    let (events, has_more) = library.events_page(0, 1000).unwrap();
    assert!(!has_more);
    let first = mirror.apply(&events).unwrap();
    assert_eq!(first.skipped, 0);
    assert_eq!(first.cursor, head);
    assert_eq!(mirrored(&mirror), synced);
    // The old id stays deleted even though its create and update replay.
    assert!(mirror.is_deleted(&old_id).unwrap());
    assert!(mirror.document(&old_id).unwrap().is_none());

    rewind_cursor(&path, 0);
    let mirror = SqliteMirror::open(&path).unwrap();
    let second = mirror.apply(&events).unwrap();
    assert_eq!(second, first);
    assert_eq!(mirrored(&mirror), synced);
}

#[test]
fn engine_recovers_from_a_cursor_left_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.db");
    let server = server(ServerConfig::default());
    let library = server.library();
    let old_id = busy_library(library);

    {
        let engine = client(&server, SqliteMirror::open(&path).unwrap(), 2);
        engine.sync().unwrap();
    }
    rewind_cursor(&path, 0);

    let engine = client(&server, SqliteMirror::open(&path).unwrap(), 2);
    let result = engine.sync().unwrap();
    assert_eq!(result.pulled as i64, library.head().unwrap());
    assert_eq!(result.skipped, 0);
    assert!(result.ignored > 0);
    assert_eq!(result.cursor, library.head().unwrap());
    assert_eq!(mirrored(engine.mirror()), expected(library));
    assert!(engine.mirror().is_deleted(&old_id).unwrap());
}

#[test]
fn sqlite_mirror_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.db");
    let server = server(ServerConfig::default());
    let library = server.library();
    for i in 0..4 {
        library
            .write_document(markdown(&format!("n{i}.md"), "x"))
            .unwrap();
    }

    {
        let engine = client(&server, SqliteMirror::open(&path).unwrap(), 3);
        engine.sync().unwrap();
    }

    library.write_document(markdown("n9.md", "late")).unwrap();

    let engine = client(&server, SqliteMirror::open(&path).unwrap(), 3);
    assert_eq!(engine.mirror().cursor().unwrap(), 4);
    let result = engine.sync().unwrap();
    assert_eq!(result.pulled, 1);
    assert_eq!(result.cursor, 5);
    assert_eq!(mirrored(engine.mirror()), expected(library));
    assert!(engine.mirror().document_by_path("n9.md").unwrap().is_some());
}

#[test]
fn server_batch_cap_is_respected() {
    let server = server(ServerConfig::new().with_max_pull_batch(2));
    let library = server.library();
    for i in 0..5 {
        library
            .write_document(markdown(&format!("d{i}.md"), "x"))
            .unwrap();
    }

    let engine = client(&server, MemoryMirror::new(), 1000);
    let result = engine.sync().unwrap();
    assert_eq!(result.batches, 3);
    assert_eq!(result.applied, 5);
}

#[test]
fn mirror_ahead_of_server_is_rebuilt() {
    let old = server(ServerConfig::default());
    for i in 0..5 {
        old.library()
            .write_document(markdown(&format!("old{i}.md"), "x"))
            .unwrap();
    }
    let mirror = Arc::new(MemoryMirror::new());
    {
        let transport = Arc::new(ChannelTransport::new(Loopback {
            server: Arc::clone(&old),
        }));
        SyncEngine::with_shared(SyncConfig::new("laptop"), transport, Arc::clone(&mirror))
            .sync()
            .unwrap();
    }
    assert_eq!(mirror.cursor().unwrap(), 5);

    // A rebuilt server with a shorter log.
    let fresh = server(ServerConfig::default());
    fresh
        .library()
        .write_document(markdown("new.md", "x"))
        .unwrap();
    let transport = Arc::new(ChannelTransport::new(Loopback {
        server: Arc::clone(&fresh),
    }));
    let engine = SyncEngine::with_shared(SyncConfig::new("laptop"), transport, Arc::clone(&mirror));

    let result = engine.sync().unwrap();
    assert!(result.reset);
    assert_eq!(result.cursor, 1);
    assert_eq!(mirrored(mirror.as_ref()), expected(fresh.library()));
}

#[derive(Debug, Clone)]
enum Step {
    Write(usize, String),
    Delete(usize),
    Sync,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0usize..4, "[a-c]{1,2}").prop_map(|(i, c)| Step::Write(i, c)),
        1 => (0usize..4).prop_map(Step::Delete),
        1 => Just(Step::Sync),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn interleaved_syncs_converge(steps in prop::collection::vec(step(), 1..30), batch in 1u32..5) {
        let server = server(ServerConfig::default());
        let library = server.library();
        let engine = client(&server, MemoryMirror::new(), batch);

        for step in &steps {
            match step {
                Step::Write(i, content) => {
                    library.write_document(markdown(&format!("p{i}.md"), content)).unwrap();
                }
                Step::Delete(i) => {
                    if let Some(doc) = library.document_by_path(&format!("p{i}.md")).unwrap() {
                        library.delete_document(&doc.doc_id).unwrap();
                    }
                }
                Step::Sync => {
                    engine.sync().unwrap();
                }
            }
        }
        engine.sync().unwrap();

        prop_assert_eq!(mirrored(engine.mirror()), expected(library));
        prop_assert_eq!(engine.mirror().cursor().unwrap(), library.head().unwrap());

        // A full replay from the start of the log is a no-op.
        let before = mirrored(engine.mirror());
        let (events, _) = library.events_page(0, 1000).unwrap();
        engine.mirror().apply(&events).unwrap();
        prop_assert_eq!(mirrored(engine.mirror()), before);
    }
}
