//! Persistent storage engines
//!
//! Credentials and users can live in PostgreSQL; challenge sessions always stay
//! in process memory.

mod postgres;

pub use postgres::PostgresStore;
