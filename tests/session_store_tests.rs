//! Session store concurrency tests

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use vpn_console::random::{SeededRandom, SystemRandom};
use vpn_console::session::{DEFAULT_SESSION_TTL, SessionStore};

fn shared_store() -> Arc<SessionStore> {
    Arc::new(SessionStore::new(DEFAULT_SESSION_TTL, Arc::new(SystemRandom)))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_ten_thousand_concurrent_creates_are_distinct() {
    // GIVEN: one store shared by many tasks
    let store = shared_store();

    // WHEN: 10,000 sessions are created concurrently
    let handles = (0..10_000).map(|i| {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.create(&format!("user-{i}")).unwrap().token })
    });
    let tokens: Vec<String> = join_all(handles)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    // THEN: every token is distinct and registered
    let unique: HashSet<&String> = tokens.iter().collect();
    assert_eq!(unique.len(), 10_000);
    assert_eq!(store.len(), 10_000);
    assert!(tokens.iter().all(|t| store.get(t).is_some()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_mixed_operations_preserve_the_map() {
    // GIVEN: 500 sessions, of which every even one will be deleted
    let store = shared_store();
    let tokens: Vec<String> = (0..500)
        .map(|i| store.create(&format!("user-{i}")).unwrap().token)
        .collect();

    // WHEN: deletes, reads, cleanups and fresh creates race each other
    let mut handles = Vec::new();
    for (i, token) in tokens.iter().cloned().enumerate() {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                store.delete(&token);
            } else {
                assert!(store.get(&token).is_some());
            }
            if i % 50 == 0 {
                assert_eq!(store.cleanup(), 0);
            }
            store.create("late").unwrap();
        }));
    }
    for result in join_all(handles).await {
        result.unwrap();
    }

    // THEN: exactly the odd originals survive, plus every new session
    for (i, token) in tokens.iter().enumerate() {
        assert_eq!(store.get(token).is_some(), i % 2 == 1, "token #{i}");
    }
    assert_eq!(store.len(), 250 + 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_expired_sessions_are_evicted_and_swept() {
    // GIVEN: a store whose sessions expire immediately
    let store = Arc::new(SessionStore::new(Duration::ZERO, Arc::new(SystemRandom)));
    let read_token = store.create("admin").unwrap().token;
    store.create("idle").unwrap();

    // WHEN: one is read
    assert!(store.get(&read_token).is_none());

    // THEN: background eviction and the sweep together remove both
    store.shutdown().await;
    let swept = store.cleanup();
    assert!(swept <= 2);
    assert!(store.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_periodic_cleanup_runs_and_shuts_down() {
    let store = Arc::new(SessionStore::new(
        Duration::from_millis(20),
        Arc::new(SystemRandom),
    ));
    store.spawn_cleanup(Duration::from_millis(10));

    for i in 0..20 {
        store.create(&format!("user-{i}")).unwrap();
    }
    assert_eq!(store.len(), 20);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(store.is_empty());

    // Shutdown completes with the sweep stopped
    tokio::time::timeout(Duration::from_secs(5), store.shutdown())
        .await
        .unwrap();
}

#[test]
fn test_seeded_source_gives_reproducible_tokens() {
    let a = SessionStore::new(DEFAULT_SESSION_TTL, Arc::new(SeededRandom::from_seed(42)));
    let b = SessionStore::new(DEFAULT_SESSION_TTL, Arc::new(SeededRandom::from_seed(42)));

    let first_a = a.create("admin").unwrap();
    let first_b = b.create("admin").unwrap();
    assert_eq!(first_a.token, first_b.token);

    let second_a = a.create("admin").unwrap();
    assert_ne!(first_a.token, second_a.token);
}
