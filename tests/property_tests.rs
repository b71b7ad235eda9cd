//! Property-based tests for the cache facade and SQL rendering.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Stored values come back unchanged, and falsy values are never a miss
//! - Fudged TTLs stay within 5% of the requested TTL
//! - Chunked table-cache payloads reassemble for any chunk size
//! - Escaped literals survive a trip through `SQLite`
//! - Loose equality treats integers and their text form alike

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use argos_data::cache::{
    Cache, CacheBackend, CacheBackendKind, CacheRegistry, TableCacheBackend, fudge_ttl,
};
use argos_data::config::CacheSettings;
use argos_data::db::Database;
use argos_data::sql::{Value, escape_val};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn facade(kind: CacheBackendKind) -> Cache {
    let registry = CacheRegistry::new(CacheSettings::default(), false);
    Cache::new(&registry, kind, "prop").unwrap()
}

fn cacheable_kind() -> impl Strategy<Value = CacheBackendKind> {
    prop::sample::select(vec![
        CacheBackendKind::Variable,
        CacheBackendKind::Local,
        CacheBackendKind::Table,
    ])
}

// ============================================================================
// Cache Facade
// ============================================================================

proptest! {
    /// Property: a stored string map is returned exactly.
    #[test]
    fn prop_cache_roundtrip(
        kind in cacheable_kind(),
        key in "[a-z0-9:_-]{1,40}",
        value in prop::collection::btree_map("[a-z]{1,8}", ".{0,64}", 0..8),
    ) {
        let cache = facade(kind);
        prop_assert!(cache.set(&key, &value, 60, true));
        let fetched: Option<BTreeMap<String, String>> = cache.get(&key);
        prop_assert_eq!(fetched, Some(value));
    }

    /// Property: `false`, `0` and `""` are hits, not misses.
    #[test]
    fn prop_falsy_values_are_hits(kind in cacheable_kind(), key in "[a-z]{1,20}") {
        let cache = facade(kind);

        let key_bool = format!("{key}-bool");
        prop_assert!(cache.set(&key_bool, &false, 60, false));
        let key_int = format!("{key}-int");
        prop_assert!(cache.set(&key_int, &0_i64, 60, false));
        let key_str = format!("{key}-str");
        prop_assert!(cache.set(&key_str, "", 60, false));

        prop_assert_eq!(cache.get::<bool>(&format!("{key}-bool")), Some(false));
        prop_assert_eq!(cache.get::<i64>(&format!("{key}-int")), Some(0));
        prop_assert_eq!(cache.get::<String>(&format!("{key}-str")), Some(String::new()));
        prop_assert_eq!(cache.get::<bool>(&format!("{key}-missing")), None);
    }

    /// Property: a deleted key is a miss.
    #[test]
    fn prop_delete_then_miss(kind in cacheable_kind(), key in "[a-z]{1,20}", n in any::<i64>()) {
        let cache = facade(kind);
        prop_assert!(cache.set(&key, &n, 60, false));
        prop_assert!(cache.delete(&key));
        prop_assert_eq!(cache.get::<i64>(&key), None);
    }

    /// Property: fudged TTLs stay within [0.95, 1.05] of the input and never
    /// drop below one second.
    #[test]
    fn prop_fudge_bounds(ttl in 1u64..1_000_000) {
        for _ in 0..50 {
            let fudged = fudge_ttl(ttl);
            prop_assert!(fudged >= 1);
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                let low = ((ttl as f64) * 0.95).ceil() as u64;
                let high = ((ttl as f64) * 1.05).floor() as u64;
                prop_assert!(fudged >= low.max(1), "{} < {} for ttl {}", fudged, low, ttl);
                prop_assert!(fudged <= high.max(1), "{} > {} for ttl {}", fudged, high, ttl);
            }
        }
    }

    /// Property: payloads of any length reassemble from their chunks.
    #[test]
    fn prop_table_chunks_reassemble(
        payload in prop::collection::vec(any::<u8>(), 0..2048),
        chunk_len in 1usize..300,
    ) {
        let backend = TableCacheBackend::open(None, chunk_len, 0.0).unwrap();
        prop_assert!(backend.set("k", &payload, 60).unwrap());
        prop_assert_eq!(backend.get("k").unwrap(), Some(payload));
    }
}

// ============================================================================
// SQL Rendering
// ============================================================================

proptest! {
    /// Property: an escaped literal reads back as the original text.
    #[test]
    fn prop_escaped_literal_roundtrips(text in "[^\u{0}]{0,80}") {
        let cache = Arc::new(CacheRegistry::new(CacheSettings::default(), false));
        let db = Database::open_in_memory("prop", cache).unwrap();
        let row = db
            .select_row(&format!("SELECT '{}' AS v", escape_val(&text)), None, None)
            .unwrap();
        prop_assert_eq!(row.get("v"), Some(&Value::Text(text)));
    }

    /// Property: an integer loosely equals its decimal text form.
    #[test]
    fn prop_integer_loosely_equals_text(n in any::<i64>()) {
        prop_assert!(Value::Integer(n).loosely_equals(&Value::Text(n.to_string())));
        prop_assert!(!Value::Integer(n).loosely_equals(&Value::Null));
    }
}
