//! Persistence: schema, migrations, and the SQLite-backed `Database`.

pub mod database;
pub mod schema;
