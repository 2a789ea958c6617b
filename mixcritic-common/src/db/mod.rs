//! Database initialization and schema

pub mod init;
pub mod schema;

pub use init::{create_schema, init_database};
