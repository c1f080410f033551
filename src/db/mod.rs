mod from_row;
mod schema;
pub mod queries;

pub use schema::init_db;

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::IdentityVerifier;
use crate::email::Notifier;
use crate::payments::Gateways;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    /// System of record for questions, answers and the ledger
    pub db: DbPool,
    /// Base URL for gateway redirects (e.g., https://questiongo.com.br)
    pub base_url: String,
    /// Bearer token verification. None = auth not configured (fail closed).
    pub identity: Option<Arc<dyn IdentityVerifier>>,
    /// Configured payment gateways
    pub gateways: Gateways,
    /// Best-effort email delivery
    pub notifier: Arc<dyn Notifier>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
    });
    Pool::builder().max_size(10).build(manager)
}
