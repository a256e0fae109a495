//! Postgres-backed stock store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate material / purchase item / link id, or a second reversal of the same target |
//! | Database (serialization failure) | `40001` | retried, then `Conflict` | Concurrent transactions could not be serialized |
//! | Database (deadlock) | `40P01` | retried, then `Conflict` | Two batches locked rows in conflicting order |
//! | Database (other) | Any other | `Storage` | Other database errors |
//! | PoolClosed | N/A | `Storage` | Connection pool was closed |
//! | Other | N/A | `Storage` | Network errors, connection failures, etc. |
//!
//! ## Lost updates
//!
//! Quantities are never written from a value read earlier. Each movement runs
//! `UPDATE materials SET quantity = quantity + $delta ... RETURNING quantity`
//! and the ledger entry's previous/new quantities come from the returned row.
//! Rows touched by a batch are locked up front in id order so concurrent
//! batches do not deadlock each other.
//!
//! ## Reversal guards
//!
//! Two partial unique indexes (migration `0002`) allow one reversal per
//! consumption entry and one fallback reversal per job, material and
//! component. A batch planned from a stale read fails with `Conflict`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument, warn};
use uuid::Uuid;

use bagforge_core::{ComponentLinkId, ExpectedVersion, LedgerEntryId, MaterialId, PurchaseItemId};
use bagforge_inventory::{EntryMetadata, LedgerEntry, Material, NewMaterial, StockMovement};

use super::r#trait::{
    ComponentLink, HardDeleteCounts, PurchaseItem, StockStore, StoreError, WillBeDeleted,
    WillBeModified, WillBePreserved,
};
use crate::config::DatabaseConfig;

/// Postgres-backed stock store.
///
/// ## Thread Safety
///
/// Uses the SQLx connection pool, which is `Send + Sync`. Every batch runs in
/// one transaction.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
    max_write_retries: u32,
}

/// Failure inside one transaction attempt. Retryable database errors are
/// kept raw so the caller can decide whether to try again.
enum TxError {
    Sql(sqlx::Error),
    Store(StoreError),
}

impl From<sqlx::Error> for TxError {
    fn from(value: sqlx::Error) -> Self {
        TxError::Sql(value)
    }
}

impl From<StoreError> for TxError {
    fn from(value: StoreError) -> Self {
        TxError::Store(value)
    }
}

impl PostgresStockStore {
    pub fn new(pool: PgPool, max_write_retries: u32) -> Self {
        Self {
            pool: Arc::new(pool),
            max_write_retries,
        }
    }

    /// Connect a pool per `config` and run pending migrations.
    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub async fn connect(config: &DatabaseConfig, max_write_retries: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Storage(format!("migration failed: {e}")))?;
        Ok(Self::new(pool, max_write_retries))
    }

    #[instrument(
        skip(self, movements),
        fields(movement_count = movements.len(), committed_entries = tracing::field::Empty),
        err
    )]
    pub async fn commit_movements(
        &self,
        movements: Vec<StockMovement>,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        if movements.is_empty() {
            return Ok(vec![]);
        }
        for movement in &movements {
            movement
                .validate()
                .map_err(|err| StoreError::InvalidMovement {
                    material_id: movement.material_id,
                    reason: err.to_string(),
                })?;
        }

        let mut attempt = 0;
        loop {
            match self.try_commit(&movements).await {
                Ok(entries) => {
                    Span::current().record("committed_entries", entries.len());
                    return Ok(entries);
                }
                Err(TxError::Sql(e)) if is_retryable(&e) && attempt < self.max_write_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "retrying stock batch after transient conflict");
                }
                Err(TxError::Sql(e)) => return Err(map_sqlx_error("commit_movements", e)),
                Err(TxError::Store(e)) => return Err(e),
            }
        }
    }

    async fn try_commit(&self, movements: &[StockMovement]) -> Result<Vec<LedgerEntry>, TxError> {
        let mut tx = self.pool.begin().await?;

        let mut ids: Vec<Uuid> = movements.iter().map(|m| *m.material_id.as_uuid()).collect();
        ids.sort();
        ids.dedup();
        sqlx::query("SELECT id FROM materials WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await?;

        let at = Utc::now();
        let mut entries = Vec::with_capacity(movements.len());
        for movement in movements {
            entries.push(apply_movement(&mut tx, movement.clone(), at).await?);
        }

        tx.commit().await?;
        Ok(entries)
    }

    #[instrument(skip(self, new), fields(material_id = %new.id), err)]
    pub async fn onboard_material(
        &self,
        new: NewMaterial,
    ) -> Result<(Material, Option<LedgerEntry>), StoreError> {
        new.validate().map_err(|err| StoreError::InvalidMovement {
            material_id: new.id,
            reason: err.to_string(),
        })?;
        let opening = new.opening_movement();
        let material = new.into_material();

        let result: Result<_, TxError> = async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                r#"
                INSERT INTO materials (id, name, unit, quantity, rate, version)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(material.id().as_uuid())
            .bind(material.name())
            .bind(material.unit())
            .bind(material.quantity())
            .bind(material.rate())
            .bind(0i64)
            .execute(&mut *tx)
            .await?;

            let entry = match opening {
                Some(movement) => Some(apply_movement(&mut tx, movement, Utc::now()).await?),
                None => None,
            };
            tx.commit().await?;
            Ok(entry)
        }
        .await;

        let entry = match result {
            Ok(entry) => entry,
            Err(TxError::Sql(e)) => return Err(map_sqlx_error("onboard_material", e)),
            Err(TxError::Store(e)) => return Err(e),
        };
        let material = match &entry {
            Some(e) => Material::restore(
                material.id(),
                material.name().to_string(),
                material.unit().to_string(),
                e.new_quantity,
                material.rate(),
                1,
            ),
            None => material,
        };
        Ok((material, entry))
    }

    #[instrument(skip(self), fields(material_id = %id), err)]
    pub async fn load_material(&self, id: MaterialId) -> Result<Option<Material>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, unit, quantity, rate, version
            FROM materials
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_material", e))?;

        row.map(|row| {
            MaterialRow::from_row(&row)
                .map(Material::from)
                .map_err(|e| StoreError::Storage(format!("failed to decode material row: {e}")))
        })
        .transpose()
    }

    #[instrument(skip(self), fields(reference_id = %reference_id), err)]
    pub async fn load_entries_for_reference(
        &self,
        reference_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(&format!("{SELECT_ENTRIES} WHERE reference_id = $1 ORDER BY sequence ASC"))
            .bind(reference_id)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_entries_for_reference", e))?;
        decode_entries(&rows)
    }

    #[instrument(skip(self), fields(material_id = %material_id), err)]
    pub async fn load_entries_for_material(
        &self,
        material_id: MaterialId,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(&format!("{SELECT_ENTRIES} WHERE material_id = $1 ORDER BY sequence ASC"))
            .bind(material_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_entries_for_material", e))?;
        decode_entries(&rows)
    }

    #[instrument(skip(self, item), fields(purchase_item_id = %item.id), err)]
    pub async fn save_purchase_item(&self, item: PurchaseItem) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO purchase_items (id, purchase_reference, material_id, quantity, rate)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.purchase_reference)
        .bind(item.material_id.map(Uuid::from))
        .bind(item.quantity)
        .bind(item.rate)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_purchase_item", e))?;
        Ok(())
    }

    pub async fn load_purchase_item(
        &self,
        id: PurchaseItemId,
    ) -> Result<Option<PurchaseItem>, StoreError> {
        let row = sqlx::query(
            "SELECT id, purchase_reference, material_id, quantity, rate FROM purchase_items WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_purchase_item", e))?;

        row.map(|row| -> Result<PurchaseItem, sqlx::Error> {
            Ok(PurchaseItem {
                id: PurchaseItemId::from_uuid(row.try_get("id")?),
                purchase_reference: row.try_get("purchase_reference")?,
                material_id: row.try_get::<Option<Uuid>, _>("material_id")?.map(MaterialId::from),
                quantity: row.try_get("quantity")?,
                rate: row.try_get("rate")?,
            })
        })
        .transpose()
        .map_err(|e| StoreError::Storage(format!("failed to decode purchase item row: {e}")))
    }

    #[instrument(skip(self, link), fields(component_link_id = %link.id), err)]
    pub async fn save_component_link(&self, link: ComponentLink) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO component_links (id, catalog_item, component_type, material_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(link.id.as_uuid())
        .bind(&link.catalog_item)
        .bind(link.component_type.as_str())
        .bind(link.material_id.map(Uuid::from))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_component_link", e))?;
        Ok(())
    }

    pub async fn load_component_link(
        &self,
        id: ComponentLinkId,
    ) -> Result<Option<ComponentLink>, StoreError> {
        let row = sqlx::query(
            "SELECT id, catalog_item, component_type, material_id FROM component_links WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_component_link", e))?;

        row.map(|row| -> Result<ComponentLink, sqlx::Error> {
            Ok(ComponentLink {
                id: ComponentLinkId::from_uuid(row.try_get("id")?),
                catalog_item: row.try_get("catalog_item")?,
                component_type: row.try_get::<String, _>("component_type")?.into(),
                material_id: row.try_get::<Option<Uuid>, _>("material_id")?.map(MaterialId::from),
            })
        })
        .transpose()
        .map_err(|e| StoreError::Storage(format!("failed to decode component link row: {e}")))
    }

    #[instrument(skip(self), fields(material_id = %material_id), err)]
    pub async fn impact_of_hard_delete(
        &self,
        material_id: MaterialId,
    ) -> Result<HardDeleteCounts, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let exists = sqlx::query("SELECT 1 FROM materials WHERE id = $1")
            .bind(material_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("impact_of_hard_delete", e))?;
        if exists.is_none() {
            return Err(StoreError::MaterialNotFound(material_id));
        }
        let counts = count_impact_in(&mut tx, material_id)
            .await
            .map_err(|e| map_sqlx_error("impact_of_hard_delete", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(counts)
    }

    #[instrument(skip(self, expected), fields(material_id = %material_id, expected_version = ?expected_version), err)]
    pub async fn delete_material(
        &self,
        material_id: MaterialId,
        expected_version: ExpectedVersion,
        expected: &HardDeleteCounts,
    ) -> Result<HardDeleteCounts, StoreError> {
        let result: Result<HardDeleteCounts, TxError> = async {
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query("SELECT version FROM materials WHERE id = $1 FOR UPDATE")
                .bind(material_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::MaterialNotFound(material_id))?;
            let version: i64 = row.try_get("version")?;
            if !expected_version.matches(version as u64) {
                return Err(StoreError::Conflict(format!(
                    "material {material_id} changed since preview (expected: {expected_version:?}, actual: {version})"
                ))
                .into());
            }

            let counts = count_impact_in(&mut tx, material_id).await?;
            if counts != *expected {
                return Err(StoreError::Conflict(format!(
                    "impact of deleting material {material_id} changed since preview"
                ))
                .into());
            }

            sqlx::query(
                "DELETE FROM ledger_entries WHERE material_id = $1 AND transaction_type <> 'consumption'",
            )
            .bind(material_id.as_uuid())
            .execute(&mut *tx)
            .await?;
            sqlx::query("UPDATE purchase_items SET material_id = NULL WHERE material_id = $1")
                .bind(material_id.as_uuid())
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE component_links SET material_id = NULL WHERE material_id = $1")
                .bind(material_id.as_uuid())
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM materials WHERE id = $1")
                .bind(material_id.as_uuid())
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(counts)
        }
        .await;

        match result {
            Ok(counts) => Ok(counts),
            Err(TxError::Sql(e)) => Err(map_sqlx_error("delete_material", e)),
            Err(TxError::Store(e)) => Err(e),
        }
    }
}

const SELECT_ENTRIES: &str = r#"
    SELECT
        id,
        sequence,
        material_id,
        quantity,
        transaction_type,
        reference_id,
        reference_number,
        metadata,
        previous_quantity,
        new_quantity,
        created_at
    FROM ledger_entries
"#;

/// Apply one movement as an atomic delta and append its ledger entry.
async fn apply_movement(
    tx: &mut Transaction<'_, Postgres>,
    movement: StockMovement,
    at: DateTime<Utc>,
) -> Result<LedgerEntry, TxError> {
    let material_id = movement.material_id;
    let expected = match movement.expected_version {
        ExpectedVersion::Any => None,
        ExpectedVersion::Exact(v) => Some(v as i64),
    };

    let updated = sqlx::query(
        r#"
        UPDATE materials
        SET quantity = quantity + $2, version = version + 1
        WHERE id = $1 AND ($3::bigint IS NULL OR version = $3)
        RETURNING quantity, unit
        "#,
    )
    .bind(material_id.as_uuid())
    .bind(movement.delta)
    .bind(expected)
    .fetch_optional(&mut **tx)
    .await?;

    let Some(updated) = updated else {
        let exists = sqlx::query("SELECT version FROM materials WHERE id = $1")
            .bind(material_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?;
        return Err(match exists {
            Some(row) => {
                let actual: i64 = row.try_get("version")?;
                StoreError::Conflict(format!(
                    "optimistic concurrency check failed for material {material_id} (expected: {:?}, actual: {actual})",
                    movement.expected_version
                ))
            }
            None => StoreError::MaterialNotFound(material_id),
        }
        .into());
    };

    let new_quantity: Decimal = updated.try_get("quantity")?;
    let unit: String = updated.try_get("unit")?;
    let previous_quantity = new_quantity - movement.delta;

    let id = LedgerEntryId::new();
    let mut entry = movement.into_entry(id, 0, &unit, previous_quantity, new_quantity, at);
    let metadata = serde_json::to_value(&entry.metadata)
        .map_err(|e| StoreError::Storage(format!("metadata serialization failed: {e}")))?;

    let row = sqlx::query(
        r#"
        INSERT INTO ledger_entries (
            id,
            material_id,
            quantity,
            transaction_type,
            reference_id,
            reference_number,
            metadata,
            previous_quantity,
            new_quantity,
            created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING sequence
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(material_id.as_uuid())
    .bind(entry.quantity)
    .bind(entry.transaction_type.as_str())
    .bind(entry.reference_id)
    .bind(&entry.reference_number)
    .bind(&metadata)
    .bind(entry.previous_quantity)
    .bind(entry.new_quantity)
    .bind(entry.created_at)
    .fetch_one(&mut **tx)
    .await?;
    let sequence: i64 = row.try_get("sequence")?;
    entry.sequence = sequence as u64;
    Ok(entry)
}

async fn count_impact_in(
    tx: &mut Transaction<'_, Postgres>,
    material_id: MaterialId,
) -> Result<HardDeleteCounts, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM ledger_entries
                WHERE material_id = $1 AND transaction_type <> 'consumption') AS non_consumption,
            (SELECT COUNT(*) FROM ledger_entries
                WHERE material_id = $1 AND transaction_type = 'consumption') AS consumption,
            (SELECT COUNT(*) FROM purchase_items WHERE material_id = $1) AS purchase_items,
            (SELECT COUNT(*) FROM component_links WHERE material_id = $1) AS component_links
        "#,
    )
    .bind(material_id.as_uuid())
    .fetch_one(&mut **tx)
    .await?;

    let count = |name: &str| -> Result<u64, sqlx::Error> { Ok(row.try_get::<i64, _>(name)? as u64) };
    Ok(HardDeleteCounts {
        will_be_deleted: WillBeDeleted {
            material: 1,
            non_consumption_transactions: count("non_consumption")?,
        },
        will_be_preserved: WillBePreserved {
            consumption_transactions: count("consumption")?,
        },
        will_be_modified: WillBeModified {
            purchase_items_lose_material_ref: count("purchase_items")?,
            component_links_lose_material_ref: count("component_links")?,
        },
    })
}

/// Map SQLx errors to `StoreError` with operation context.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Serialization failures and deadlocks are worth another attempt.
fn is_retryable(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return matches!(code.as_ref(), "40001" | "40P01");
        }
    }
    false
}

fn decode_entries(rows: &[sqlx::postgres::PgRow]) -> Result<Vec<LedgerEntry>, StoreError> {
    rows.iter()
        .map(|row| {
            LedgerEntryRow::from_row(row)
                .map_err(|e| StoreError::Storage(format!("failed to decode ledger row: {e}")))
                .and_then(LedgerEntry::try_from)
        })
        .collect()
}

// SQLx row types

#[derive(Debug)]
struct MaterialRow {
    id: Uuid,
    name: String,
    unit: String,
    quantity: Decimal,
    rate: Decimal,
    version: i64,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for MaterialRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(MaterialRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            unit: row.try_get("unit")?,
            quantity: row.try_get("quantity")?,
            rate: row.try_get("rate")?,
            version: row.try_get("version")?,
        })
    }
}

impl From<MaterialRow> for Material {
    fn from(row: MaterialRow) -> Self {
        Material::restore(
            MaterialId::from_uuid(row.id),
            row.name,
            row.unit,
            row.quantity,
            row.rate,
            row.version as u64,
        )
    }
}

#[derive(Debug)]
struct LedgerEntryRow {
    id: Uuid,
    sequence: i64,
    material_id: Uuid,
    quantity: Decimal,
    transaction_type: String,
    reference_id: Option<Uuid>,
    reference_number: Option<String>,
    metadata: serde_json::Value,
    previous_quantity: Decimal,
    new_quantity: Decimal,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for LedgerEntryRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(LedgerEntryRow {
            id: row.try_get("id")?,
            sequence: row.try_get("sequence")?,
            material_id: row.try_get("material_id")?,
            quantity: row.try_get("quantity")?,
            transaction_type: row.try_get("transaction_type")?,
            reference_id: row.try_get("reference_id")?,
            reference_number: row.try_get("reference_number")?,
            metadata: row.try_get("metadata")?,
            previous_quantity: row.try_get("previous_quantity")?,
            new_quantity: row.try_get("new_quantity")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<LedgerEntryRow> for LedgerEntry {
    type Error = StoreError;

    fn try_from(row: LedgerEntryRow) -> Result<Self, Self::Error> {
        let transaction_type = row
            .transaction_type
            .parse()
            .map_err(|e| StoreError::Storage(format!("ledger row {}: {e}", row.id)))?;
        let metadata: EntryMetadata = serde_json::from_value(row.metadata)
            .map_err(|e| StoreError::Storage(format!("ledger row {} metadata: {e}", row.id)))?;
        Ok(LedgerEntry {
            id: LedgerEntryId::from_uuid(row.id),
            sequence: row.sequence as u64,
            material_id: MaterialId::from_uuid(row.material_id),
            quantity: row.quantity,
            transaction_type,
            reference_id: row.reference_id,
            reference_number: row.reference_number,
            metadata,
            previous_quantity: row.previous_quantity,
            new_quantity: row.new_quantity,
            created_at: row.created_at,
        })
    }
}

// Implement StockStore trait

impl PostgresStockStore {
    /// Run `fut` to completion from the synchronous `StockStore` surface.
    ///
    /// Requires a multi-threaded tokio runtime: the calling worker is marked
    /// as blocking while the query runs.
    fn block_on<F, T>(&self, fut: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            StoreError::Storage(
                "PostgresStockStore requires a tokio runtime; call it from within one".to_string(),
            )
        })?;
        tokio::task::block_in_place(|| handle.block_on(fut))
    }
}

impl StockStore for PostgresStockStore {
    fn onboard(&self, material: NewMaterial) -> Result<(Material, Option<LedgerEntry>), StoreError> {
        self.block_on(self.onboard_material(material))
    }

    fn material(&self, id: MaterialId) -> Result<Option<Material>, StoreError> {
        self.block_on(self.load_material(id))
    }

    fn commit(&self, movements: Vec<StockMovement>) -> Result<Vec<LedgerEntry>, StoreError> {
        self.block_on(self.commit_movements(movements))
    }

    fn entries_for_reference(&self, reference_id: Uuid) -> Result<Vec<LedgerEntry>, StoreError> {
        self.block_on(self.load_entries_for_reference(reference_id))
    }

    fn entries_for_material(
        &self,
        material_id: MaterialId,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        self.block_on(self.load_entries_for_material(material_id))
    }

    fn insert_purchase_item(&self, item: PurchaseItem) -> Result<(), StoreError> {
        self.block_on(self.save_purchase_item(item))
    }

    fn purchase_item(&self, id: PurchaseItemId) -> Result<Option<PurchaseItem>, StoreError> {
        self.block_on(self.load_purchase_item(id))
    }

    fn insert_component_link(&self, link: ComponentLink) -> Result<(), StoreError> {
        self.block_on(self.save_component_link(link))
    }

    fn component_link(&self, id: ComponentLinkId) -> Result<Option<ComponentLink>, StoreError> {
        self.block_on(self.load_component_link(id))
    }

    fn hard_delete_impact(&self, material_id: MaterialId) -> Result<HardDeleteCounts, StoreError> {
        self.block_on(self.impact_of_hard_delete(material_id))
    }

    fn hard_delete(
        &self,
        material_id: MaterialId,
        expected_version: ExpectedVersion,
        expected: &HardDeleteCounts,
    ) -> Result<HardDeleteCounts, StoreError> {
        self.block_on(self.delete_material(material_id, expected_version, expected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bagforge_core::{ComponentId, JobId, OrderId};
    use bagforge_inventory::TransactionType;
    use rust_decimal_macros::dec;

    #[test]
    fn ledger_row_decodes_metadata_and_type() {
        let job = JobId::new();
        let component = ComponentId::new();
        let row = LedgerEntryRow {
            id: Uuid::now_v7(),
            sequence: 42,
            material_id: Uuid::now_v7(),
            quantity: dec!(-7.3),
            transaction_type: "consumption".to_string(),
            reference_id: Some(*job.as_uuid()),
            reference_number: None,
            metadata: serde_json::json!({
                "component_id": component.to_string(),
                "component_type": "Printing",
                "order_id": OrderId::new().to_string(),
                "job_id": job.to_string(),
                "unit": "m",
            }),
            previous_quantity: dec!(87.5),
            new_quantity: dec!(80.2),
            created_at: Utc::now(),
        };

        let entry = LedgerEntry::try_from(row).unwrap();
        assert_eq!(entry.transaction_type, TransactionType::Consumption);
        assert_eq!(entry.sequence, 42);
        assert_eq!(entry.metadata.component_id, Some(component));
        assert_eq!(entry.metadata.component_type.as_ref().map(|t| t.as_str()), Some("printing"));
        assert!(entry.references_job(job));
    }

    #[test]
    fn unknown_transaction_type_is_a_storage_error() {
        let row = LedgerEntryRow {
            id: Uuid::now_v7(),
            sequence: 1,
            material_id: Uuid::now_v7(),
            quantity: dec!(1),
            transaction_type: "teleport".to_string(),
            reference_id: None,
            reference_number: None,
            metadata: serde_json::json!({}),
            previous_quantity: dec!(0),
            new_quantity: dec!(1),
            created_at: Utc::now(),
        };
        assert!(matches!(LedgerEntry::try_from(row), Err(StoreError::Storage(_))));
    }
}
