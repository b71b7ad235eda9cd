//! Shared `SQLite` plumbing.
//!
//! Both the relational router and the table cache backend hold a
//! `Mutex<Connection>`; this module owns how those connections are opened,
//! configured, and locked.

mod connection;

pub use connection::{acquire_lock, configure_connection, open_endpoint};
