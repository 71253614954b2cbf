//! Authoritative order store backed by PostgreSQL.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use super::{OrderStore, StoreResult};
use crate::error::StoreError;
use crate::types::{OrderId, Status};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS orders (
    id          BIGINT PRIMARY KEY,
    product     TEXT NOT NULL DEFAULT '',
    customer_id BIGINT NOT NULL DEFAULT 0,
    address     TEXT NOT NULL DEFAULT '',
    status      TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)";

fn pg_err(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(format!("postgres: {e}"))
}

fn parse_status(id: i64, raw: &str) -> StoreResult<Status> {
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("order {id} has unknown status '{raw}'")))
}

/// Ids above `i64::MAX` cannot exist in a BIGINT column.
fn to_pg_id(id: OrderId) -> Option<i64> {
    i64::try_from(id).ok()
}

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub async fn connect(url: &str, max_connections: u32, timeout: Duration) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect(url)
            .await
            .map_err(pg_err)?;
        Ok(Self { pool })
    }

    /// Create the `orders` table if it does not exist.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(pg_err)?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn get_status(&self, id: OrderId) -> StoreResult<Status> {
        let pg_id = to_pg_id(id).ok_or(StoreError::NotFound(id))?;
        let raw: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(pg_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(pg_err)?;
        match raw {
            Some(raw) => parse_status(pg_id, &raw),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn list_all(&self) -> StoreResult<Vec<(OrderId, Status)>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, status FROM orders ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(pg_err)?;
        rows.into_iter()
            .map(|(id, raw)| {
                let order_id = OrderId::try_from(id)
                    .map_err(|_| StoreError::Corrupt(format!("negative order id {id}")))?;
                Ok((order_id, parse_status(id, &raw)?))
            })
            .collect()
    }

    async fn set_status(&self, id: OrderId, status: Status) -> StoreResult<()> {
        let pg_id = to_pg_id(id).ok_or(StoreError::NotFound(id))?;
        let result = sqlx::query("UPDATE orders SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status.as_str())
            .bind(pg_id)
            .execute(&self.pool)
            .await
            .map_err(pg_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_beyond_bigint_are_rejected() {
        assert_eq!(to_pg_id(5), Some(5));
        assert_eq!(to_pg_id(u64::MAX), None);
    }

    #[test]
    fn unknown_status_text_is_corrupt() {
        assert_eq!(parse_status(3, "ENVIADO"), Ok(Status::Shipped));
        assert!(matches!(
            parse_status(3, "LOST"),
            Err(StoreError::Corrupt(msg)) if msg.contains("order 3")
        ));
    }

    /// Runs against a live database when `ORDERSYNC_TEST_POSTGRES_URL` is set.
    #[tokio::test]
    async fn status_round_trip_against_live_database() {
        let Ok(url) = std::env::var("ORDERSYNC_TEST_POSTGRES_URL") else {
            return;
        };
        let store = PgOrderStore::connect(&url, 2, Duration::from_secs(5))
            .await
            .unwrap();
        store.ensure_schema().await.unwrap();
        store.ensure_schema().await.unwrap();

        let base = 9_000_000_000 + i64::from(std::process::id());
        sqlx::query("DELETE FROM orders WHERE id IN ($1, $2)")
            .bind(base)
            .bind(base + 1)
            .execute(&store.pool)
            .await
            .unwrap();
        for (id, status) in [(base, "PENDING"), (base + 1, "ENVIADO")] {
            sqlx::query("INSERT INTO orders (id, status) VALUES ($1, $2)")
                .bind(id)
                .bind(status)
                .execute(&store.pool)
                .await
                .unwrap();
        }
        let (a, b) = (base as OrderId, (base + 1) as OrderId);

        assert_eq!(store.get_status(a).await, Ok(Status::Pending));
        assert_eq!(store.get_status(b).await, Ok(Status::Shipped));
        let listed = store.list_all().await.unwrap();
        assert!(listed.contains(&(a, Status::Pending)));
        assert!(listed.windows(2).all(|w| w[0].0 < w[1].0));

        store.set_status(a, Status::Delivered).await.unwrap();
        assert_eq!(store.get_status(a).await, Ok(Status::Delivered));

        let missing = (base + 2) as OrderId;
        assert_eq!(store.get_status(missing).await, Err(StoreError::NotFound(missing)));
        assert_eq!(
            store.set_status(missing, Status::Shipped).await,
            Err(StoreError::NotFound(missing))
        );

        sqlx::query("DELETE FROM orders WHERE id IN ($1, $2)")
            .bind(base)
            .bind(base + 1)
            .execute(&store.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unreachable_database_is_unavailable() {
        let err = PgOrderStore::connect(
            "postgres://nobody@127.0.0.1:1/none",
            1,
            Duration::from_millis(200),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
