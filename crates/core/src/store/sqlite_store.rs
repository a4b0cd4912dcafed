//! SQLite-backed entity store implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ErrorCode, ToSql, TransactionBehavior};

use super::traits::{validate_priority, EntityStore, StoreError};
use super::types::{
    Derivative, DerivativeFilter, DerivativeStatus, EntityKind, NewDerivative, NewProduct,
    Product, ProductFilter, ProductStatus, StoreStats,
};

const PRODUCT_COLUMNS: &str =
    "id, download_url, location, target, status, priority, created_at, verified";
const DERIVATIVE_COLUMNS: &str = "id, location, status, created_at, verified";

/// How long a writer waits on another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// SQLite-backed entity store.
///
/// One connection per process, guarded by a mutex. Write transactions are
/// opened `IMMEDIATE` so concurrent processes serialize on the database lock.
pub struct SqliteEntityStore {
    conn: Mutex<Connection>,
}

impl SqliteEntityStore {
    /// Open (or create) the store at `path`, creating tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(map_db)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(map_db)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .map_err(map_db)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(map_db)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS derivatives (
                id TEXT PRIMARY KEY,
                location TEXT,
                status INTEGER NOT NULL DEFAULT 0,
                created_at TEXT,
                verified INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                download_url TEXT,
                location TEXT,
                target TEXT NOT NULL REFERENCES derivatives(id),
                status INTEGER NOT NULL DEFAULT 0,
                priority INTEGER NOT NULL DEFAULT 3 CHECK (priority BETWEEN 1 AND 5),
                created_at TEXT,
                verified INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_products_status_priority ON products(status, priority, id);
            CREATE INDEX IF NOT EXISTS idx_products_target ON products(target);
            CREATE INDEX IF NOT EXISTS idx_derivatives_status ON derivatives(status);
            "#,
        )
        .map_err(map_db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn row_exists(conn: &Connection, kind: EntityKind, id: &str) -> Result<bool, StoreError> {
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)", kind.table());
        conn.query_row(&sql, params![id], |row| row.get(0))
            .map_err(map_db)
    }

    fn build_product_where(filter: &ProductFilter) -> (String, Vec<Box<dyn ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status));
        }

        if let Some(ref target) = filter.target {
            conditions.push("target = ?");
            params.push(Box::new(target.clone()));
        }

        if let Some(priority) = filter.priority {
            conditions.push("priority = ?");
            params.push(Box::new(priority));
        }

        (where_clause(&conditions), params)
    }

    fn row_to_product(row: &rusqlite::Row) -> rusqlite::Result<Product> {
        Ok(Product {
            id: row.get(0)?,
            download_url: row.get(1)?,
            location: row.get::<_, Option<String>>(2)?.map(PathBuf::from),
            target: row.get(3)?,
            status: row.get(4)?,
            priority: row.get(5)?,
            created_at: parse_timestamp(row.get(6)?),
            verified: row.get(7)?,
        })
    }

    fn row_to_derivative(row: &rusqlite::Row) -> rusqlite::Result<Derivative> {
        Ok(Derivative {
            id: row.get(0)?,
            location: row.get::<_, Option<String>>(1)?.map(PathBuf::from),
            status: row.get(2)?,
            created_at: parse_timestamp(row.get(3)?),
            verified: row.get(4)?,
        })
    }

    fn query_products(
        conn: &Connection,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<Product>, StoreError> {
        let mut stmt = conn.prepare(sql).map_err(map_db)?;
        let rows = stmt
            .query_map(params, Self::row_to_product)
            .map_err(map_db)?;

        let mut products = Vec::new();
        for row_result in rows {
            products.push(row_result.map_err(map_db)?);
        }
        Ok(products)
    }
}

impl EntityStore for SqliteEntityStore {
    fn create_product(&self, product: NewProduct) -> Result<Product, StoreError> {
        validate_priority(product.priority as i64)?;

        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_db)?;

        if Self::row_exists(&tx, EntityKind::Product, &product.id)? {
            return Err(StoreError::already_exists(EntityKind::Product, product.id));
        }

        tx.execute(
            "INSERT OR IGNORE INTO derivatives (id, status, verified) VALUES (?, ?, 0)",
            params![product.target, DerivativeStatus::Pending],
        )
        .map_err(map_db)?;

        let created_at = product.status.is_on_disk().then(Utc::now);
        tx.execute(
            "INSERT INTO products (id, download_url, location, target, status, priority, created_at, verified) VALUES (?, ?, ?, ?, ?, ?, ?, 0)",
            params![
                product.id,
                product.download_url,
                product.location.as_deref().map(path_to_sql),
                product.target,
                product.status,
                product.priority,
                created_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(map_db)?;

        tx.commit().map_err(map_db)?;

        Ok(Product {
            id: product.id,
            download_url: product.download_url,
            location: product.location,
            target: product.target,
            status: product.status,
            priority: product.priority,
            created_at,
            verified: false,
        })
    }

    fn create_derivative(&self, derivative: NewDerivative) -> Result<Derivative, StoreError> {
        let conn = self.lock()?;

        let created_at = derivative.status.is_on_disk().then(Utc::now);
        let result = conn.execute(
            "INSERT INTO derivatives (id, location, status, created_at, verified) VALUES (?, ?, ?, ?, 0)",
            params![
                derivative.id,
                derivative.location.as_deref().map(path_to_sql),
                derivative.status,
                created_at.map(|t| t.to_rfc3339()),
            ],
        );

        match result {
            Ok(_) => Ok(Derivative {
                id: derivative.id,
                location: derivative.location,
                status: derivative.status,
                created_at,
                verified: false,
            }),
            Err(e) if is_constraint(&e) => Err(StoreError::already_exists(
                EntityKind::Derivative,
                derivative.id,
            )),
            Err(e) => Err(map_db(e)),
        }
    }

    fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        let conn = self.lock()?;

        let sql = format!("SELECT {} FROM products WHERE id = ?", PRODUCT_COLUMNS);
        match conn.query_row(&sql, params![id], Self::row_to_product) {
            Ok(product) => Ok(Some(product)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(map_db(e)),
        }
    }

    fn get_derivative(&self, id: &str) -> Result<Option<Derivative>, StoreError> {
        let conn = self.lock()?;

        let sql = format!("SELECT {} FROM derivatives WHERE id = ?", DERIVATIVE_COLUMNS);
        match conn.query_row(&sql, params![id], Self::row_to_derivative) {
            Ok(derivative) => Ok(Some(derivative)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(map_db(e)),
        }
    }

    fn exists(&self, kind: EntityKind, id: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        Self::row_exists(&conn, kind, id)
    }

    fn exists_on_disk(&self, kind: EntityKind, id: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;

        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ? AND status > 0)",
            kind.table()
        );
        conn.query_row(&sql, params![id], |row| row.get(0))
            .map_err(map_db)
    }

    fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let conn = self.lock()?;

        let (where_clause, mut params) = Self::build_product_where(filter);
        let sql = format!(
            "SELECT {} FROM products {} ORDER BY priority ASC, id ASC LIMIT ?",
            PRODUCT_COLUMNS, where_clause
        );
        params.push(Box::new(limit_param(filter.limit)));

        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        Self::query_products(&conn, &sql, &param_refs)
    }

    fn list_derivatives(&self, filter: &DerivativeFilter) -> Result<Vec<Derivative>, StoreError> {
        let conn = self.lock()?;

        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status));
        }
        params.push(Box::new(limit_param(filter.limit)));

        let sql = format!(
            "SELECT {} FROM derivatives {} ORDER BY id ASC LIMIT ?",
            DERIVATIVE_COLUMNS,
            where_clause(&conditions)
        );

        let mut stmt = conn.prepare(&sql).map_err(map_db)?;
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_derivative)
            .map_err(map_db)?;

        let mut derivatives = Vec::new();
        for row_result in rows {
            derivatives.push(row_result.map_err(map_db)?);
        }
        Ok(derivatives)
    }

    fn ready_for_download(&self, limit: u32) -> Result<Vec<Product>, StoreError> {
        let conn = self.lock()?;

        let sql = format!(
            "SELECT {} FROM products WHERE status = ? AND download_url IS NOT NULL ORDER BY priority ASC, id ASC LIMIT ?",
            PRODUCT_COLUMNS
        );
        Self::query_products(&conn, &sql, params![ProductStatus::Queued, limit])
    }

    fn grouping_candidates(&self) -> Result<Vec<Product>, StoreError> {
        let conn = self.lock()?;

        let sql = "SELECT p.id, p.download_url, p.location, p.target, p.status, p.priority, p.created_at, p.verified \
                   FROM products p JOIN derivatives d ON p.target = d.id \
                   WHERE d.status = ? \
                   ORDER BY p.target ASC, p.priority ASC, p.id ASC";
        Self::query_products(&conn, sql, params![DerivativeStatus::Pending])
    }

    fn mark_retrieved(&self, id: &str, location: &Path) -> Result<(), StoreError> {
        let conn = self.lock()?;

        let updated = conn
            .execute(
                "UPDATE products SET status = ?, location = ?, created_at = ? WHERE id = ?",
                params![
                    ProductStatus::Retrieved,
                    path_to_sql(location),
                    Utc::now().to_rfc3339(),
                    id
                ],
            )
            .map_err(map_db)?;

        if updated == 0 {
            return Err(StoreError::not_found(EntityKind::Product, id));
        }
        Ok(())
    }

    fn complete_task(
        &self,
        product_ids: &[String],
        target: &str,
        location: &Path,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_db)?;

        for id in product_ids {
            let updated = tx
                .execute(
                    "UPDATE products SET status = ? WHERE id = ? AND target = ? AND status = ?",
                    params![ProductStatus::Consumed, id, target, ProductStatus::Retrieved],
                )
                .map_err(map_db)?;
            if updated == 0 {
                return Err(StoreError::Constraint(format!(
                    "product {} is not a retrieved member of {}",
                    id, target
                )));
            }
        }

        let updated = tx
            .execute(
                "UPDATE derivatives SET status = ?, location = ?, created_at = ? \
                 WHERE id = ? AND status = ?",
                params![
                    DerivativeStatus::Available,
                    path_to_sql(location),
                    Utc::now().to_rfc3339(),
                    target,
                    DerivativeStatus::Pending
                ],
            )
            .map_err(map_db)?;
        if updated == 0 {
            return Err(if Self::row_exists(&tx, EntityKind::Derivative, target)? {
                StoreError::Constraint(format!("derivative {} is not pending", target))
            } else {
                StoreError::not_found(EntityKind::Derivative, target)
            });
        }

        tx.commit().map_err(map_db)
    }

    fn update_product_status(
        &self,
        id: &str,
        status: ProductStatus,
        location: Option<&Path>,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;

        let stamp = status.is_on_disk().then(|| Utc::now().to_rfc3339());
        let updated = conn
            .execute(
                "UPDATE products SET status = ?, location = COALESCE(?, location), created_at = COALESCE(created_at, ?) WHERE id = ?",
                params![status, location.map(path_to_sql), stamp, id],
            )
            .map_err(map_db)?;

        if updated == 0 {
            return Err(StoreError::not_found(EntityKind::Product, id));
        }
        Ok(())
    }

    fn update_derivative_status(
        &self,
        id: &str,
        status: DerivativeStatus,
        location: Option<&Path>,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;

        let stamp = status.is_on_disk().then(|| Utc::now().to_rfc3339());
        let updated = conn
            .execute(
                "UPDATE derivatives SET status = ?, location = COALESCE(?, location), created_at = COALESCE(created_at, ?) WHERE id = ?",
                params![status, location.map(path_to_sql), stamp, id],
            )
            .map_err(map_db)?;

        if updated == 0 {
            return Err(StoreError::not_found(EntityKind::Derivative, id));
        }
        Ok(())
    }

    fn update_priority(&self, id: &str, priority: u8) -> Result<(), StoreError> {
        validate_priority(priority as i64)?;
        let conn = self.lock()?;

        let updated = conn
            .execute(
                "UPDATE products SET priority = ? WHERE id = ?",
                params![priority, id],
            )
            .map_err(map_db)?;

        if updated == 0 {
            return Err(StoreError::not_found(EntityKind::Product, id));
        }
        Ok(())
    }

    fn attach_download_url(&self, id: &str, url: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;

        let updated = conn
            .execute(
                "UPDATE products SET download_url = ? WHERE id = ? AND download_url IS NULL",
                params![url, id],
            )
            .map_err(map_db)?;
        Ok(updated > 0)
    }

    fn mark_verified(&self, kind: EntityKind, id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;

        let sql = format!("UPDATE {} SET verified = 1 WHERE id = ?", kind.table());
        let updated = conn.execute(&sql, params![id]).map_err(map_db)?;

        if updated == 0 {
            return Err(StoreError::not_found(kind, id));
        }
        Ok(())
    }

    fn reset_verified(&self, kind: EntityKind) -> Result<u64, StoreError> {
        let conn = self.lock()?;

        let sql = format!("UPDATE {} SET verified = 0 WHERE verified = 1", kind.table());
        let cleared = conn.execute(&sql, []).map_err(map_db)?;
        Ok(cleared as u64)
    }

    fn unverified_on_disk(&self, kind: EntityKind) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;

        // Consumed products may legitimately be gone from disk.
        let status_code = match kind {
            EntityKind::Product => ProductStatus::Retrieved.code(),
            EntityKind::Derivative => DerivativeStatus::Available.code(),
        };
        let sql = format!(
            "SELECT id FROM {} WHERE verified = 0 AND status = ? ORDER BY id ASC",
            kind.table()
        );

        let mut stmt = conn.prepare(&sql).map_err(map_db)?;
        let rows = stmt
            .query_map(params![status_code], |row| row.get::<_, String>(0))
            .map_err(map_db)?;

        let mut ids = Vec::new();
        for row_result in rows {
            ids.push(row_result.map_err(map_db)?);
        }
        Ok(ids)
    }

    fn delete(&self, kind: EntityKind, id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;

        let sql = format!("DELETE FROM {} WHERE id = ?", kind.table());
        let deleted = conn.execute(&sql, params![id]).map_err(map_db)?;

        if deleted == 0 {
            return Err(StoreError::not_found(kind, id));
        }
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.lock()?;
        let mut stats = StoreStats::default();

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM products GROUP BY status")
            .map_err(map_db)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, ProductStatus>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(map_db)?;
        for row_result in rows {
            match row_result.map_err(map_db)? {
                (ProductStatus::Queued, n) => stats.queued = n,
                (ProductStatus::Retrieved, n) => stats.retrieved = n,
                (ProductStatus::Consumed, n) => stats.consumed = n,
            }
        }

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM derivatives GROUP BY status")
            .map_err(map_db)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, DerivativeStatus>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(map_db)?;
        for row_result in rows {
            match row_result.map_err(map_db)? {
                (DerivativeStatus::Pending, n) => stats.pending = n,
                (DerivativeStatus::Available, n) => stats.available = n,
            }
        }

        Ok(stats)
    }
}

impl ToSql for ProductStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for ProductStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = i64::column_result(value)?;
        ProductStatus::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

impl ToSql for DerivativeStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for DerivativeStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = i64::column_result(value)?;
        DerivativeStatus::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

fn map_db(e: rusqlite::Error) -> StoreError {
    if is_constraint(&e) {
        StoreError::Constraint(e.to_string())
    } else {
        StoreError::Database(e.to_string())
    }
}

fn is_constraint(e: &rusqlite::Error) -> bool {
    matches!(e.sqlite_error_code(), Some(ErrorCode::ConstraintViolation))
}

fn where_clause(conditions: &[&str]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

/// SQLite treats a negative LIMIT as unbounded.
fn limit_param(limit: Option<u32>) -> i64 {
    limit.map(i64::from).unwrap_or(-1)
}

fn path_to_sql(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
