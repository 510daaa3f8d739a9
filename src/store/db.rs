use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use serde::de::DeserializeOwned;

use super::models::*;

/// Async-safe handle to the store.
///
/// Wraps `StoreDb` behind `Arc<Mutex>` and runs every query on tokio's
/// blocking pool via `spawn_blocking`, so SQLite I/O never stalls the async
/// workers.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<StoreDb>>,
}

impl DbHandle {
    pub fn new(db: StoreDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&StoreDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct StoreDb {
    conn: Connection,
}

impl StoreDb {
    /// Open (or create) the database at `path`, creating parent directories,
    /// and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.run_migrations().context("Failed to run migrations")
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS companies (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    razon_social TEXT NOT NULL,
                    rfc TEXT NOT NULL UNIQUE,
                    representante TEXT,
                    cargo TEXT,
                    domicilio TEXT
                );

                CREATE TABLE IF NOT EXISTS bids (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    convocante TEXT NOT NULL,
                    numero_licitacion TEXT NOT NULL UNIQUE,
                    objeto TEXT NOT NULL DEFAULT '',
                    presupuesto_estimado TEXT,
                    fianzas_requeridas TEXT,
                    certificaciones TEXT,
                    fecha_apertura TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS workspaces (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    logo_path TEXT,
                    cif_data TEXT,
                    acta_data TEXT,
                    prices_data TEXT,
                    analysis TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_bids_created ON bids(created_at);
                ",
            )
            .context("Failed to create tables")?;

        // Additive migrations (columns are nullable, safe to re-run).
        // We only ignore "duplicate column" errors; anything else is propagated.
        for (column, ddl) in [
            ("sources", "ALTER TABLE workspaces ADD COLUMN sources TEXT"),
            ("status", "ALTER TABLE workspaces ADD COLUMN status TEXT"),
            (
                "inconsistencias",
                "ALTER TABLE workspaces ADD COLUMN inconsistencias TEXT",
            ),
        ] {
            match self.conn.execute(ddl, []) {
                Ok(_) => {}
                Err(e) if e.to_string().contains("duplicate column") => {}
                Err(e) => return Err(anyhow::anyhow!("Failed to add {} column: {}", column, e)),
            }
        }
        Ok(())
    }

    // ── Workspaces ────────────────────────────────────────────────────

    /// Insert the workspace or merge `update` into the stored row.
    ///
    /// Merge is by coalesce: absent values, blank strings and JSON values
    /// that are null or empty containers never replace what is stored. JSON
    /// columns that do not decode as their record type are rejected before
    /// anything is written.
    pub fn upsert_workspace(&self, update: &WorkspaceUpdate) -> Result<UpsertOutcome> {
        let exists: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM workspaces WHERE id = ?1)",
                params![update.id],
                |row| row.get(0),
            )
            .context("Failed to check workspace existence")?;

        let logo_path = coalesce_value(&update.logo_path);
        let status = coalesce_value(&update.status);
        let JsonColumns {
            cif_data,
            acta_data,
            prices_data,
            sources,
            analysis,
            inconsistencias,
        } = update.json_columns()?;

        if exists {
            self.conn
                .execute(
                    "UPDATE workspaces SET
                        name = COALESCE(?2, name),
                        logo_path = COALESCE(?3, logo_path),
                        cif_data = COALESCE(?4, cif_data),
                        acta_data = COALESCE(?5, acta_data),
                        prices_data = COALESCE(?6, prices_data),
                        sources = COALESCE(?7, sources),
                        analysis = COALESCE(?8, analysis),
                        status = COALESCE(?9, status),
                        inconsistencias = COALESCE(?10, inconsistencias)
                     WHERE id = ?1",
                    params![
                        update.id,
                        update.effective_name(),
                        logo_path,
                        cif_data,
                        acta_data,
                        prices_data,
                        sources,
                        analysis,
                        status,
                        inconsistencias,
                    ],
                )
                .context("Failed to update workspace")?;
            return Ok(UpsertOutcome::Updated);
        }

        let name = update
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&update.id);
        self.conn
            .execute(
                "INSERT INTO workspaces
                    (id, name, logo_path, cif_data, acta_data, prices_data, sources,
                     analysis, status, inconsistencias)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    update.id,
                    name,
                    logo_path,
                    cif_data,
                    acta_data,
                    prices_data,
                    sources,
                    analysis,
                    status.unwrap_or(WorkspaceStatus::Created.as_str()),
                    inconsistencias,
                ],
            )
            .context("Failed to insert workspace")?;
        Ok(UpsertOutcome::Inserted)
    }

    pub fn get_workspace(&self, id: &str) -> Result<Option<WorkspaceRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?1", WORKSPACE_SELECT),
                params![id],
                WorkspaceRow::from_row,
            )
            .optional()
            .context("Failed to query workspace")?;
        Ok(row.map(WorkspaceRow::into_record))
    }

    /// All workspaces, newest first.
    pub fn list_workspaces(&self) -> Result<Vec<WorkspaceRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{} ORDER BY created_at DESC, rowid DESC",
                WORKSPACE_SELECT
            ))
            .context("Failed to prepare list_workspaces")?;
        let rows = stmt
            .query_map([], WorkspaceRow::from_row)
            .context("Failed to query workspaces")?;
        let mut workspaces = Vec::new();
        for row in rows {
            workspaces.push(row.context("Failed to read workspace row")?.into_record());
        }
        Ok(workspaces)
    }

    /// Remove the row; returns `false` when there was none.
    pub fn delete_workspace(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM workspaces WHERE id = ?1", params![id])
            .context("Failed to delete workspace")?;
        Ok(affected > 0)
    }

    // ── Bids ──────────────────────────────────────────────────────────

    /// Insert the bid, or refresh it when the tender number is known.
    pub fn upsert_bid(&self, bid: &Bid) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO bids
                    (convocante, numero_licitacion, objeto, presupuesto_estimado,
                     fianzas_requeridas, certificaciones, fecha_apertura)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(numero_licitacion) DO UPDATE SET
                    convocante = excluded.convocante,
                    objeto = excluded.objeto,
                    presupuesto_estimado = COALESCE(excluded.presupuesto_estimado, presupuesto_estimado),
                    fianzas_requeridas = COALESCE(excluded.fianzas_requeridas, fianzas_requeridas),
                    certificaciones = COALESCE(excluded.certificaciones, certificaciones),
                    fecha_apertura = COALESCE(excluded.fecha_apertura, fecha_apertura)",
                params![
                    bid.convocante,
                    bid.numero_licitacion,
                    bid.objeto,
                    bid.presupuesto_estimado,
                    bid.fianzas_requeridas,
                    bid.certificaciones,
                    bid.fecha_apertura,
                ],
            )
            .context("Failed to upsert bid")?;
        Ok(())
    }

    /// Last `limit` indexed tenders, newest first.
    pub fn recent_activity(&self, limit: usize) -> Result<Vec<Activity>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT convocante, numero_licitacion, created_at FROM bids
                 ORDER BY created_at DESC, id DESC LIMIT ?1",
            )
            .context("Failed to prepare recent_activity")?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(Activity {
                    convocante: row.get(0)?,
                    numero_licitacion: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })
            .context("Failed to query activity")?;
        let mut activity = Vec::new();
        for row in rows {
            activity.push(row.context("Failed to read activity row")?);
        }
        Ok(activity)
    }

    // ── Companies ─────────────────────────────────────────────────────

    /// Create a company; `Ok(None)` when the RFC is already registered.
    pub fn create_company(&self, company: &NewCompany) -> Result<Option<Company>> {
        let result = self.conn.execute(
            "INSERT INTO companies (razon_social, rfc, representante, cargo, domicilio)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                company.razon_social,
                company.rfc,
                company.representante,
                company.cargo,
                company.domicilio,
            ],
        );
        match result {
            Ok(_) => self
                .get_company(&company.rfc)?
                .context("Company not found after insert")
                .map(Some),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Ok(None)
            }
            Err(e) => Err(e).context("Failed to insert company"),
        }
    }

    pub fn get_company(&self, rfc: &str) -> Result<Option<Company>> {
        self.conn
            .query_row(
                "SELECT id, razon_social, rfc, representante, cargo, domicilio
                 FROM companies WHERE rfc = ?1",
                params![rfc],
                |row| {
                    Ok(Company {
                        id: row.get(0)?,
                        razon_social: row.get(1)?,
                        rfc: row.get(2)?,
                        representante: row.get(3)?,
                        cargo: row.get(4)?,
                        domicilio: row.get(5)?,
                    })
                },
            )
            .optional()
            .context("Failed to query company")
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let companies: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM companies", [], |row| row.get(0))
            .context("Failed to count companies")?;
        let bids: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM bids", [], |row| row.get(0))
            .context("Failed to count bids")?;
        Ok(StoreStats { companies, bids })
    }
}

// ── Row conversion ────────────────────────────────────────────────────

const WORKSPACE_SELECT: &str = "SELECT id, name, logo_path, cif_data, acta_data, prices_data, \
     sources, analysis, status, inconsistencias, created_at FROM workspaces";

/// Intermediate row struct for workspaces; JSON columns still encoded.
struct WorkspaceRow {
    id: String,
    name: String,
    logo_path: Option<String>,
    cif_data: Option<String>,
    acta_data: Option<String>,
    prices_data: Option<String>,
    sources: Option<String>,
    analysis: Option<String>,
    status: Option<String>,
    inconsistencias: Option<String>,
    created_at: String,
}

impl WorkspaceRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            logo_path: row.get(2)?,
            cif_data: row.get(3)?,
            acta_data: row.get(4)?,
            prices_data: row.get(5)?,
            sources: row.get(6)?,
            analysis: row.get(7)?,
            status: row.get(8)?,
            inconsistencias: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    /// Decode the JSON columns. A column that no longer matches its type is
    /// reported and treated as absent rather than failing the whole row.
    fn into_record(self) -> WorkspaceRecord {
        let id = self.id;
        WorkspaceRecord {
            cif_data: decode_column(&id, "cif_data", self.cif_data.as_deref()),
            acta_data: decode_column(&id, "acta_data", self.acta_data.as_deref()),
            prices_data: decode_column(&id, "prices_data", self.prices_data.as_deref()),
            sources: decode_column(&id, "sources", self.sources.as_deref()).unwrap_or_default(),
            analysis: decode_column(&id, "analysis", self.analysis.as_deref()),
            inconsistencias: decode_column(&id, "inconsistencias", self.inconsistencias.as_deref()),
            name: self.name,
            logo_path: self.logo_path,
            status: self.status,
            created_at: self.created_at,
            id,
        }
    }
}

fn decode_column<T: DeserializeOwned>(id: &str, column: &str, raw: Option<&str>) -> Option<T> {
    let raw = raw.filter(|r| !crate::util::is_blank_text(r))?;
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(workspace_id = %id, column, error = %e, "undecodable workspace column");
            None
        }
    }
}
