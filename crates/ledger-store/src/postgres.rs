use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    ActorId, CorrelationId, EntryId, ItemId, LedgerEntry, LedgerQuery, NewLedgerEntry, Result,
    StockKey, StockRecord, StoreError, WarehouseId,
    store::{
        CasOutcome, CommitOutcome, LedgerStream, LedgerWriter, QuantityStore, ReplaySnapshot,
        StockStore, validate_entries_for_append,
    },
};

const STOCK_COLUMNS: &str = "warehouse_id, item_id, quantity, updated_at";
const LEDGER_COLUMNS: &str = "id, warehouse_id, item_id, quantity_change, resulting_quantity, reason, actor_id, correlation_id, timestamp";

/// PostgreSQL-backed stock store.
///
/// Overrides [`StockStore::commit_mutation`] so the quantity update and the
/// ledger insert share one transaction.
#[derive(Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    /// Creates a new PostgreSQL stock store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<StockRecord> {
        Ok(StockRecord {
            warehouse_id: WarehouseId::new(row.try_get("warehouse_id")?),
            item_id: ItemId::new(row.try_get("item_id")?),
            quantity: row.try_get("quantity")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_entry(row: PgRow) -> Result<LedgerEntry> {
        Ok(LedgerEntry {
            id: EntryId::new(row.try_get("id")?),
            warehouse_id: WarehouseId::new(row.try_get("warehouse_id")?),
            item_id: ItemId::new(row.try_get("item_id")?),
            quantity_change: row.try_get("quantity_change")?,
            resulting_quantity: row.try_get("resulting_quantity")?,
            reason: row.try_get("reason")?,
            actor_id: ActorId::new(row.try_get("actor_id")?),
            correlation_id: row
                .try_get::<Option<Uuid>, _>("correlation_id")?
                .map(CorrelationId::from_uuid),
            timestamp: row.try_get("timestamp")?,
        })
    }

    /// Update-with-precondition on one connection (pooled or transactional).
    async fn cas_on(
        conn: &mut PgConnection,
        key: StockKey,
        expected: i64,
        new: i64,
    ) -> Result<CasOutcome> {
        if new < 0 {
            return Err(StoreError::InvalidEntry(format!(
                "quantity for {key} must not be negative, got {new}"
            )));
        }

        // An absent row counts as zero, so only an expected zero may insert.
        let applied: Option<PgRow> = if expected == 0 {
            sqlx::query(&format!(
                r#"
                INSERT INTO stock_records (warehouse_id, item_id, quantity, updated_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (warehouse_id, item_id) DO UPDATE
                    SET quantity = EXCLUDED.quantity, updated_at = NOW()
                    WHERE stock_records.quantity = 0
                RETURNING {STOCK_COLUMNS}
                "#
            ))
            .bind(key.warehouse_id.as_i64())
            .bind(key.item_id.as_i64())
            .bind(new)
            .fetch_optional(&mut *conn)
            .await?
        } else {
            sqlx::query(&format!(
                r#"
                UPDATE stock_records
                SET quantity = $3, updated_at = NOW()
                WHERE warehouse_id = $1 AND item_id = $2 AND quantity = $4
                RETURNING {STOCK_COLUMNS}
                "#
            ))
            .bind(key.warehouse_id.as_i64())
            .bind(key.item_id.as_i64())
            .bind(new)
            .bind(expected)
            .fetch_optional(&mut *conn)
            .await?
        };

        match applied {
            Some(row) => Ok(CasOutcome::Applied(Self::row_to_record(row)?)),
            None => {
                let actual: Option<i64> = sqlx::query_scalar(
                    "SELECT quantity FROM stock_records WHERE warehouse_id = $1 AND item_id = $2",
                )
                .bind(key.warehouse_id.as_i64())
                .bind(key.item_id.as_i64())
                .fetch_optional(&mut *conn)
                .await?;
                Ok(CasOutcome::Conflict {
                    actual: actual.unwrap_or(0),
                })
            }
        }
    }

    async fn insert_entry(conn: &mut PgConnection, entry: &NewLedgerEntry) -> Result<EntryId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO ledger_entries
                (warehouse_id, item_id, quantity_change, resulting_quantity, reason, actor_id, correlation_id, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(entry.key.warehouse_id.as_i64())
        .bind(entry.key.item_id.as_i64())
        .bind(entry.quantity_change)
        .bind(entry.resulting_quantity)
        .bind(&entry.reason)
        .bind(entry.actor_id.as_i64())
        .bind(entry.correlation_id.map(|c| c.as_uuid()))
        .bind(entry.timestamp)
        .fetch_one(&mut *conn)
        .await?;

        Ok(EntryId::new(id))
    }
}

#[async_trait]
impl QuantityStore for PostgresStockStore {
    async fn get_record(&self, key: StockKey) -> Result<Option<StockRecord>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_records WHERE warehouse_id = $1 AND item_id = $2"
        ))
        .bind(key.warehouse_id.as_i64())
        .bind(key.item_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn compare_and_set(&self, key: StockKey, expected: i64, new: i64) -> Result<CasOutcome> {
        let mut conn = self.pool.acquire().await?;
        Self::cas_on(&mut conn, key, expected, new).await
    }

    async fn list(&self, warehouse_id: Option<WarehouseId>) -> Result<Vec<StockRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {STOCK_COLUMNS}
            FROM stock_records
            WHERE ($1::BIGINT IS NULL OR warehouse_id = $1)
            ORDER BY warehouse_id ASC, item_id ASC
            "#
        ))
        .bind(warehouse_id.map(|w| w.as_i64()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }
}

#[async_trait]
impl LedgerWriter for PostgresStockStore {
    async fn append_batch(&self, entries: Vec<NewLedgerEntry>) -> Result<Vec<EntryId>> {
        validate_entries_for_append(&entries)?;

        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(entries.len());
        for entry in &entries {
            ids.push(Self::insert_entry(&mut tx, entry).await?);
        }
        tx.commit().await?;

        metrics::counter!("ledger_entries_appended_total", "backend" => "postgres")
            .increment(ids.len() as u64);
        Ok(ids)
    }

    async fn query(&self, query: LedgerQuery) -> Result<LedgerStream> {
        use futures_util::stream;

        let mut sql = format!("SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE 1=1");
        let mut param_count = 0;

        if query.item_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND item_id = ${param_count}"));
        }
        if query.warehouse_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND warehouse_id = ${param_count}"));
        }
        if query.correlation_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND correlation_id = ${param_count}"));
        }

        sql.push_str(" ORDER BY id DESC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(item_id) = query.item_id {
            sqlx_query = sqlx_query.bind(item_id.as_i64());
        }
        if let Some(warehouse_id) = query.warehouse_id {
            sqlx_query = sqlx_query.bind(warehouse_id.as_i64());
        }
        if let Some(correlation_id) = query.correlation_id {
            sqlx_query = sqlx_query.bind(correlation_id.as_uuid());
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(i64::try_from(offset).unwrap_or(i64::MAX));
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        let entries: Vec<Result<LedgerEntry>> = rows.into_iter().map(Self::row_to_entry).collect();

        Ok(Box::pin(stream::iter(entries)))
    }

    async fn replay_sum(&self, key: StockKey) -> Result<i64> {
        let sum: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(quantity_change), 0)::BIGINT
            FROM ledger_entries
            WHERE warehouse_id = $1 AND item_id = $2
            "#,
        )
        .bind(key.warehouse_id.as_i64())
        .bind(key.item_id.as_i64())
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    async fn commit_mutation(&self, expected: i64, entry: NewLedgerEntry) -> Result<CommitOutcome> {
        entry.validate()?;

        let mut tx = self.pool.begin().await?;

        let record = match Self::cas_on(&mut tx, entry.key, expected, entry.resulting_quantity)
            .await?
        {
            CasOutcome::Applied(record) => record,
            // Dropping the transaction rolls it back.
            CasOutcome::Conflict { actual } => return Ok(CommitOutcome::Conflict { actual }),
        };

        let entry_id = Self::insert_entry(&mut tx, &entry).await?;
        tx.commit().await?;
        metrics::counter!("ledger_entries_appended_total", "backend" => "postgres").increment(1);

        Ok(CommitOutcome::Committed { record, entry_id })
    }

    async fn replay_snapshot(&self, key: StockKey) -> Result<Option<ReplaySnapshot>> {
        // One statement reads both tables from the same snapshot.
        let (stored, replayed): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE((
                    SELECT quantity FROM stock_records
                    WHERE warehouse_id = $1 AND item_id = $2
                ), 0)::BIGINT,
                COALESCE((
                    SELECT SUM(quantity_change) FROM ledger_entries
                    WHERE warehouse_id = $1 AND item_id = $2
                ), 0)::BIGINT
            "#,
        )
        .bind(key.warehouse_id.as_i64())
        .bind(key.item_id.as_i64())
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(ReplaySnapshot { stored, replayed }))
    }
}
