mod client;
mod guard;

pub use client::PostgresClient;
pub use guard::validate_sql;
