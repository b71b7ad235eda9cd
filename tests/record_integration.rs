//! Active-record integration tests.
//!
//! Exercise loads, diff-minimal saves and cursors against real `SQLite`
//! databases, including a table living in an attached schema.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use argos_data::cache::{CacheBackendKind, CacheRegistry};
use argos_data::config::{CacheSettings, ConnectionSettings, DataConfig, EndpointConfig};
use argos_data::db::{ConnectionRegistry, Database};
use argos_data::record::{
    Criteria, FieldPermission, LoadOptions, Record, RecordSet, RowStatus, SortDirection, Table,
    TableIdentity,
};
use argos_data::sql::{Comparison, FieldValue, Value};
use argos_data::Error;
use std::sync::Arc;
use tempfile::TempDir;

mod blog {
    use super::{FieldPermission, Table};

    pub struct Articles;
    impl Table for Articles {
        const DATABASE: Option<&'static str> = Some("main");

        fn field_permissions() -> Vec<(&'static str, FieldPermission)> {
            vec![
                ("views", FieldPermission::ReadOnly),
                ("edit_token", FieldPermission::NoAccess),
            ]
        }
    }
}

mod lab {
    use super::Table;

    pub struct Things;
    impl Table for Things {
        const DATABASE: Option<&'static str> = Some("main");
        const CREATED_COLUMN: Option<&'static str> = None;
        const MODIFIED_COLUMN: Option<&'static str> = None;
    }
}

mod acl {
    use super::Table;

    pub struct UserGroups;
    impl Table for UserGroups {
        const CREATED_COLUMN: Option<&'static str> = None;
        const MODIFIED_COLUMN: Option<&'static str> = None;
    }
}

use acl::UserGroups;
use blog::Articles;
use lab::Things;

// ============================================================================
// Test Helpers
// ============================================================================

const ARTICLES_SCHEMA: &str = "
    CREATE TABLE articles (
        id INTEGER PRIMARY KEY,
        title TEXT,
        body TEXT,
        status TEXT NOT NULL DEFAULT 'draft',
        views INTEGER NOT NULL DEFAULT 0,
        edit_token TEXT,
        date_added TEXT,
        date_modified TEXT
    );
";

fn database() -> Arc<Database> {
    let cache = Arc::new(CacheRegistry::new(CacheSettings::default(), false));
    let db = Database::open_in_memory("app", cache).unwrap();
    assert!(db.execute_batch(ARTICLES_SCHEMA));
    Arc::new(db)
}

fn insert_article(db: &Database, id: i64, title: &str, body: &str) {
    let sql = format!(
        "INSERT INTO articles (id, title, body, edit_token) VALUES ({id}, {}, {}, 'tok')",
        Value::from(title).to_sql_literal(),
        Value::from(body).to_sql_literal()
    );
    assert!(db.query(&sql).success);
}

fn stored(db: &Database, id: i64, column: &str) -> Option<Value> {
    db.select_val(
        &format!("SELECT `{column}` FROM articles WHERE id = {id}"),
        None,
        None,
    )
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_by_primary_key() {
    let db = database();
    insert_article(&db, 7, "Seven", "body");

    let article = Record::<Articles>::load(&db, 7).unwrap();
    assert!(article.valid());
    assert!(!article.is_new());
    assert_eq!(article.pk(), Some(&FieldValue::from(Value::Integer(7))));
    assert_eq!(
        article.value("title").unwrap(),
        Some(&Value::Text("Seven".to_string()))
    );
}

#[test]
fn test_load_missing_row_is_not_valid() {
    let db = database();

    let mut missing = Record::<Articles>::load(&db, 404).unwrap();
    assert!(!missing.valid());
    assert_eq!(missing.status(), RowStatus::NotFound);

    // Writing to a missing row turns it into a new one.
    missing.set("title", "Recovered").unwrap();
    assert_eq!(missing.status(), RowStatus::New);
    assert!(missing.valid());
}

#[test]
fn test_load_by_comparison() {
    let db = database();
    insert_article(&db, 1, "a", "x");
    insert_article(&db, 2, "b", "x");
    insert_article(&db, 3, "c", "y");

    let criteria = Criteria::by("id", Comparison::gte(2)).and("body", "x");
    let record = Record::<Articles>::load_by(&db, criteria, &LoadOptions::default()).unwrap();
    assert_eq!(record.value("title").unwrap(), Some(&Value::from("b")));
}

#[test]
fn test_cached_load_serves_stale_row() {
    let db = database();
    insert_article(&db, 1, "first", "x");
    let options = LoadOptions::default().cached(CacheBackendKind::Variable, Some(60));

    let before = Record::<Articles>::load_by(&db, Criteria::by("id", 1), &options).unwrap();
    assert!(db.query("UPDATE articles SET title = 'second' WHERE id = 1").success);
    let cached = Record::<Articles>::load_by(&db, Criteria::by("id", 1), &options).unwrap();
    let fresh = Record::<Articles>::load(&db, 1).unwrap();

    assert_eq!(before.value("title").unwrap(), Some(&Value::from("first")));
    assert_eq!(cached.value("title").unwrap(), Some(&Value::from("first")));
    assert_eq!(fresh.value("title").unwrap(), Some(&Value::from("second")));
}

// ============================================================================
// Saving
// ============================================================================

#[test]
fn test_insert_populates_server_defaults() {
    let db = database();

    let mut article = Record::<Articles>::new(&db);
    article.set("title", "Fresh").unwrap();
    let pk = article.save(false).unwrap();

    assert_eq!(pk, Some(Value::Integer(1)));
    assert_eq!(article.status(), RowStatus::Persisted);
    assert_eq!(article.value("status").unwrap(), Some(&Value::from("draft")));
    assert_eq!(article.value("views").unwrap(), Some(&Value::Integer(0)));
    assert!(!article.value("date_added").unwrap().unwrap().is_null());
    assert!(!article.value("date_modified").unwrap().unwrap().is_null());
    assert!(!article.is_dirty());
}

#[test]
fn test_insert_with_explicit_primary_key() {
    let db = database();

    let mut article = Record::<Articles>::new(&db);
    article.set("id", 42).unwrap();
    article.set("title", "Answer").unwrap();

    assert_eq!(article.save(true).unwrap(), Some(Value::Integer(42)));
    assert_eq!(stored(&db, 42, "title"), Some(Value::from("Answer")));
}

#[test]
fn test_update_writes_only_changed_columns() {
    let db = database();
    insert_article(&db, 1, "Title", "Original body");

    let mut article = Record::<Articles>::load(&db, 1).unwrap();
    // Another writer changes `body` after this record was loaded.
    assert!(db.query("UPDATE articles SET body = 'Concurrent body' WHERE id = 1").success);

    article.set("title", "New title").unwrap();
    assert_eq!(article.changes().len(), 1);
    assert_eq!(article.save(false).unwrap(), Some(Value::Integer(1)));

    assert_eq!(stored(&db, 1, "title"), Some(Value::from("New title")));
    assert_eq!(stored(&db, 1, "body"), Some(Value::from("Concurrent body")));
    assert!(stored(&db, 1, "date_modified").is_some());
}

#[test]
fn test_save_without_changes_writes_nothing() {
    let db = database();
    insert_article(&db, 1, "Title", "Body");

    let mut article = Record::<Articles>::load(&db, 1).unwrap();
    // Loose equality: integer 1 and text "1" are the same value.
    article.set("id", "1").unwrap();
    article.set("title", "Title").unwrap();
    assert!(!article.is_dirty());

    assert!(db.query("UPDATE articles SET title = 'Elsewhere' WHERE id = 1").success);
    assert_eq!(article.save(false).unwrap(), Some(Value::Integer(1)));
    assert_eq!(stored(&db, 1, "title"), Some(Value::from("Elsewhere")));
    assert_eq!(stored(&db, 1, "date_modified"), None);
}

#[test]
fn test_failed_update_keeps_changes() {
    let db = database();
    insert_article(&db, 1, "Title", "Body");

    let mut article = Record::<Articles>::load(&db, 1).unwrap();
    article.set("status", Value::Null).unwrap();

    assert_eq!(article.save(false).unwrap(), None);
    assert!(db.last_error().is_some());
    assert!(article.is_dirty());
    assert_eq!(stored(&db, 1, "status"), Some(Value::from("draft")));
}

#[test]
fn test_update_with_expression() {
    let db = database();
    insert_article(&db, 1, "Title", "Body");

    let mut article = Record::<Articles>::load(&db, 1).unwrap();
    article
        .set("body", argos_data::sql::Expression::raw("upper(title)"))
        .unwrap();
    article.save(false).unwrap();

    assert_eq!(stored(&db, 1, "body"), Some(Value::from("TITLE")));
}

#[test]
fn test_untyped_column_keeps_numeric_storage_class() {
    let db = database();
    assert!(db.execute_batch("CREATE TABLE things (id INTEGER PRIMARY KEY, v)"));
    let storage_class = || db.select_val("SELECT typeof(v) FROM things WHERE id = 1", None, None);

    let mut thing = Record::<Things>::new(&db);
    thing.set("v", 5).unwrap();
    assert_eq!(thing.save(false).unwrap(), Some(Value::Integer(1)));
    assert_eq!(storage_class(), Some(Value::from("integer")));

    let mut loaded = Record::<Things>::load(&db, 1).unwrap();
    assert_eq!(loaded.value("v").unwrap(), Some(&Value::Integer(5)));

    loaded.set("v", 2.5).unwrap();
    loaded.save(false).unwrap();
    assert_eq!(storage_class(), Some(Value::from("real")));
    assert_eq!(
        Record::<Things>::load(&db, 1).unwrap().value("v").unwrap(),
        Some(&Value::Real(2.5))
    );
}

// ============================================================================
// Permissions
// ============================================================================

#[test]
fn test_field_permissions() {
    let db = database();
    insert_article(&db, 1, "Title", "Body");
    let mut article = Record::<Articles>::load(&db, 1).unwrap();

    assert!(article.get("views").unwrap().is_some());
    assert!(matches!(
        article.set("views", 10),
        Err(Error::ContractViolation(_))
    ));
    assert!(matches!(
        article.get("edit_token"),
        Err(Error::ContractViolation(_))
    ));
    assert!(matches!(
        article.set("edit_token", "x"),
        Err(Error::ContractViolation(_))
    ));
    assert!(!article.data().contains_key("edit_token"));
    assert!(article.data().contains_key("title"));
}

// ============================================================================
// Record Sets
// ============================================================================

#[test]
fn test_record_set_cursor_and_keyed_access() {
    let db = database();
    for (id, title) in [(1, "one"), (2, "two"), (3, "three")] {
        insert_article(&db, id, title, "x");
    }

    let options = LoadOptions::all().order_by("id", SortDirection::Desc);
    let mut set = RecordSet::<Articles>::load(&db, &Criteria::new(), &options).unwrap();
    assert_eq!(set.count(), 3);
    assert!(set.valid());
    assert_eq!(
        set.current().unwrap().value("title").unwrap(),
        Some(&Value::from("three"))
    );

    assert!(set.next());
    assert!(set.next());
    assert!(!set.next());
    assert!(!set.valid());
    set.rewind();
    assert!(set.valid());

    let two = set.get(2).unwrap();
    two.set("title", "TWO").unwrap();
    assert_eq!(
        set.current().unwrap().value("title").unwrap(),
        Some(&Value::from("TWO"))
    );
    assert!(set.contains(1));
    assert!(!set.contains(9));

    let saved = set.save_all(false).unwrap();
    assert_eq!(saved.len(), 3);
    assert_eq!(stored(&db, 2, "title"), Some(Value::from("TWO")));
    assert_eq!(stored(&db, 1, "date_modified"), None);
}

#[test]
fn test_empty_record_set() {
    let db = database();

    let mut set =
        RecordSet::<Articles>::load(&db, &Criteria::by("status", "published"), &LoadOptions::all())
            .unwrap();
    assert_eq!(set.count(), 0);
    assert!(!set.valid());
    assert!(set.current().is_none());
    assert!(!set.next());
    assert!(set.keys().is_empty());
}

// ============================================================================
// Derived Identity
// ============================================================================

#[test]
fn test_identity_derived_from_module_and_type() {
    let identity = TableIdentity::of::<UserGroups>().unwrap();
    assert_eq!(identity.schema, "acl");
    assert_eq!(identity.table, "user_groups");
    assert_eq!(identity.pk, "id");
}

#[test]
fn test_record_in_attached_schema() {
    let dir = TempDir::new().unwrap();
    let config = DataConfig::default()
        .with_database(
            "app",
            ConnectionSettings::new(
                EndpointConfig::new(dir.path().join("app.db"))
                    .with_attached("acl", dir.path().join("acl.db")),
            ),
        )
        .with_default_database("app");
    let db = ConnectionRegistry::new(config).get(None).unwrap();
    assert!(db.execute_batch(
        "CREATE TABLE `acl`.`user_groups` (id INTEGER PRIMARY KEY, name TEXT NOT NULL)"
    ));

    let mut group = Record::<UserGroups>::new(&db);
    group.set("name", "admins").unwrap();
    let pk = group.save(false).unwrap().unwrap();

    let loaded = Record::<UserGroups>::load(&db, pk).unwrap();
    assert_eq!(loaded.value("name").unwrap(), Some(&Value::from("admins")));
    assert_eq!(loaded.status(), RowStatus::Persisted);
}
