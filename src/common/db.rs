// Database connection and transaction helpers

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Sqlite, SqlitePool, Transaction};

/// How long a writer waits for the database write lock before failing.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn connect_options(database_url: &str) -> Result<SqliteConnectOptions, sqlx::Error> {
    Ok(SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true))
}

/// Open a transaction that already holds the database write lock.
///
/// A deferred transaction that reads first and writes later cannot upgrade
/// its snapshot while another writer is active, and SQLite fails it at once
/// with SQLITE_BUSY. Writing first takes the lock up front, which waits out
/// `BUSY_TIMEOUT` like `BEGIN IMMEDIATE` would. Dropping the transaction
/// without committing rolls it back.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE users SET id = id WHERE 0")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

/// File-backed WAL database with the full schema and `max_connections`
/// independent connections.
#[cfg(test)]
pub async fn file_pool(max_connections: u32) -> SqlitePool {
    use sqlx::sqlite::SqlitePoolOptions;

    let path = std::env::temp_dir().join(format!("sponsor-auth-{}.db", uuid::Uuid::new_v4()));
    let url = format!("sqlite://{}", path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(connect_options(&url).unwrap())
        .await
        .unwrap();

    super::migrations::create_schema(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writers_wait_for_each_other() {
        let pool = file_pool(4).await;

        let mut first = begin_write(&pool).await.unwrap();
        sqlx::query("INSERT INTO users (id, created_at, updated_at) VALUES ('U1', 'now', 'now')")
            .execute(&mut *first)
            .await
            .unwrap();

        let second = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let mut tx = begin_write(&pool).await?;
                let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
                    .fetch_one(&mut *tx)
                    .await?;
                tx.commit().await?;
                Ok::<_, sqlx::Error>(count)
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        first.commit().await.unwrap();

        assert_eq!(second.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dropped_write_rolls_back() {
        let pool = file_pool(2).await;

        {
            let mut tx = begin_write(&pool).await.unwrap();
            sqlx::query("INSERT INTO users (id, created_at, updated_at) VALUES ('U1', 'now', 'now')")
                .execute(&mut *tx)
                .await
                .unwrap();
        }

        let mut tx = begin_write(&pool).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *tx)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
