// Session store tests
// Author: kelexine (https://github.com/kelexine)

use gem2openai::config::SessionConfig;
use gem2openai::gemini::{ChatMetadata, ChatSession};
use gem2openai::sessions::{InMemorySessionStore, SessionStore};
use std::sync::Arc;
use std::time::Duration;

fn session_with_cid(cid: &str) -> ChatSession {
    let mut session = ChatSession::new("gemini-2.0-flash");
    session.metadata = ChatMetadata {
        conversation_id: Some(cid.to_string()),
        response_id: Some("r_1".to_string()),
        choice_id: Some("rc_1".to_string()),
    };
    session
}

#[test]
fn test_round_trip_preserves_metadata() {
    let store = InMemorySessionStore::new(4, Duration::from_secs(60));
    store.put("conv", session_with_cid("c_42"));

    let session = store.take("conv").unwrap();
    assert_eq!(session.metadata.conversation_id.as_deref(), Some("c_42"));
    assert_eq!(session.model, "gemini-2.0-flash");
}

#[test]
fn test_capacity_evicts_least_recent() {
    let store = InMemorySessionStore::new(2, Duration::from_secs(60));
    store.put("a", session_with_cid("c_a"));
    store.put("b", session_with_cid("c_b"));

    // Returning "a" makes it the most recent entry.
    let a = store.take("a").unwrap();
    store.put("a", a);
    store.put("c", session_with_cid("c_c"));

    assert_eq!(store.len(), 2);
    assert!(store.take("b").is_none());
    assert!(store.take("a").is_some());
    assert!(store.take("c").is_some());
}

#[test]
fn test_evict() {
    let store = InMemorySessionStore::new(4, Duration::from_secs(60));
    store.put("conv", session_with_cid("c_1"));
    store.evict("conv");
    assert!(store.is_empty());
    store.evict("missing");
}

#[test]
fn test_zero_capacity_still_holds_one() {
    let store = InMemorySessionStore::from_config(&SessionConfig {
        max_entries: 0,
        ttl_seconds: 60,
    });
    store.put("only", session_with_cid("c_1"));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_concurrent_checkout_is_exclusive() {
    let store = Arc::new(InMemorySessionStore::new(8, Duration::from_secs(60)));
    store.put("shared", session_with_cid("c_shared"));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.take("shared").is_some())
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
}
