//! Run schema migrations under the `db_migrate` lock
//!
//! Several instances usually boot at the same time; only the one holding the
//! lock applies migrations while the others wait for it (the retry budget
//! covers roughly 80 minutes) and then find nothing left to do.

use super::lock::{LockError, Locker};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub const MIGRATION_LOCK_NAME: &str = "db_migrate";
const MIGRATION_LOCK_TTL: Duration = Duration::from_secs(10 * 60);
const MIGRATION_RETRY_DELAY: Duration = Duration::from_secs(5);
const MIGRATION_RETRY_COUNT: u32 = 1000;

/// Applies pending schema changes. Must be idempotent.
#[async_trait]
pub trait Migrator: Send + Sync {
    async fn migrate(&self) -> anyhow::Result<()>;
}

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("could not migrate: error while getting lock on db_migrate: {0}")]
    Lock(#[from] LockError),

    #[error("could not migrate: unable to get lock on db_migrate")]
    Contended,

    #[error("could not migrate: {0}")]
    Migration(#[source] anyhow::Error),
}

/// Acquire the migration lock, run `migrator`, and release the lock.
///
/// The lock is released whether or not the migration succeeds. Losing the
/// lock before release (the TTL ran out mid-migration) is logged, not
/// returned, because the migration itself already finished.
pub async fn run_migrations(locker: &Locker, migrator: &dyn Migrator) -> Result<(), MigrateError> {
    tracing::info!("acquiring lock for {}", MIGRATION_LOCK_NAME);
    let mutex = locker
        .mutex(MIGRATION_LOCK_NAME)
        .ttl(MIGRATION_LOCK_TTL)
        .retry_delay(MIGRATION_RETRY_DELAY)
        .retry_count(MIGRATION_RETRY_COUNT)
        .build();

    if !mutex.lock().await? {
        tracing::error!("unable to get lock on {}", MIGRATION_LOCK_NAME);
        return Err(MigrateError::Contended);
    }
    tracing::info!("lock acquired successfully for {}", MIGRATION_LOCK_NAME);

    let result = migrator.migrate().await;

    if let Err(e) = mutex.unlock().await {
        tracing::warn!(error = %e, "failed to release {}", MIGRATION_LOCK_NAME);
    }

    match result {
        Ok(()) => {
            tracing::info!("migration did run successfully");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "migration failed");
            Err(MigrateError::Migration(e))
        }
    }
}
