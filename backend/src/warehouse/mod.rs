//! Warehouse - file-backed store of materialized relations
//!
//! Each relation lives in `<root>/<schema>/<name>.json` as a [`StoredTable`].
//! Writes replace the whole document via a temp file and a rename, so a
//! reader sees either the previous materialization or the new one.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{WarehouseError, WarehouseResult};
use crate::models::Relation;

/// Default warehouse directory (relative to current dir)
pub const DEFAULT_WAREHOUSE_DIR: &str = ".saas-metrics/warehouse";

/// A materialized relation with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTable<R> {
    /// Address of the relation
    pub relation: Relation,
    /// Column names, in order
    pub columns: Vec<String>,
    /// Rows
    pub rows: Vec<R>,
    /// Number of rows
    pub row_count: usize,
    /// Materialization timestamp (RFC 3339)
    pub materialized_at: String,
    /// Run that produced this materialization
    pub run_id: Option<String>,
}

/// Borrowed form of [`StoredTable`] used for writing
#[derive(Serialize)]
struct TableRef<'a, R> {
    relation: &'a Relation,
    columns: &'a [&'a str],
    rows: &'a [R],
    row_count: usize,
    materialized_at: &'a str,
    run_id: Option<&'a str>,
}

/// Summary of a stored relation, without its rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationInfo {
    pub relation: Relation,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub materialized_at: String,
}

/// File-backed warehouse
#[derive(Debug, Clone)]
pub struct Warehouse {
    root: PathBuf,
}

impl Warehouse {
    /// Open a warehouse rooted at `root`. The directory is created on first write.
    pub fn open(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, relation: &Relation) -> PathBuf {
        self.root
            .join(&relation.schema)
            .join(format!("{}.json", relation.name))
    }

    /// Whether the relation has been materialized
    pub fn exists(&self, relation: &Relation) -> bool {
        self.path_for(relation).is_file()
    }

    /// Read a relation, failing with `RelationNotFound` if it was never materialized
    pub fn read_table<R: DeserializeOwned>(&self, relation: &Relation) -> WarehouseResult<StoredTable<R>> {
        let path = self.path_for(relation);
        if !path.is_file() {
            return Err(WarehouseError::RelationNotFound(relation.to_string()));
        }

        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| WarehouseError::Corrupt {
            relation: relation.to_string(),
            message: e.to_string(),
        })
    }

    /// Read only the rows of a relation
    pub fn read_rows<R: DeserializeOwned>(&self, relation: &Relation) -> WarehouseResult<Vec<R>> {
        Ok(self.read_table(relation)?.rows)
    }

    /// Replace a relation with `rows`
    pub fn write_table<R: Serialize>(
        &self,
        relation: &Relation,
        columns: &[&str],
        rows: &[R],
        run_id: Option<&str>,
    ) -> WarehouseResult<RelationInfo> {
        let materialized_at = chrono::Utc::now().to_rfc3339();
        let table = TableRef {
            relation,
            columns,
            rows,
            row_count: rows.len(),
            materialized_at: &materialized_at,
            run_id,
        };

        let path = self.path_for(relation);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        // One temp file per write, so concurrent writers never share it
        let tmp = path.with_file_name(format!(".{}.{}.tmp", relation.name, Uuid::new_v4()));
        let content = serde_json::to_string_pretty(&table)?;
        if let Err(e) = fs::write(&tmp, content).and_then(|_| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        Ok(RelationInfo {
            relation: relation.clone(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            row_count: rows.len(),
            materialized_at,
        })
    }

    /// Append rows to a relation, creating it if needed
    pub fn append_rows<R: Serialize + DeserializeOwned>(
        &self,
        relation: &Relation,
        columns: &[&str],
        rows: Vec<R>,
    ) -> WarehouseResult<RelationInfo> {
        let mut existing: Vec<R> = if self.exists(relation) {
            self.read_rows(relation)?
        } else {
            Vec::new()
        };
        existing.extend(rows);
        self.write_table(relation, columns, &existing, None)
    }

    /// Drop a relation
    pub fn drop_table(&self, relation: &Relation) -> WarehouseResult<()> {
        let path = self.path_for(relation);
        if !path.is_file() {
            return Err(WarehouseError::RelationNotFound(relation.to_string()));
        }
        fs::remove_file(&path)?;
        Ok(())
    }

    /// List all stored relations, sorted by schema then name
    pub fn list(&self) -> WarehouseResult<Vec<RelationInfo>> {
        let mut infos = Vec::new();
        if !self.root.is_dir() {
            return Ok(infos);
        }

        for schema_entry in fs::read_dir(&self.root)?.flatten() {
            if !schema_entry.path().is_dir() {
                continue;
            }
            for entry in fs::read_dir(schema_entry.path())?.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "json") {
                    let content = fs::read_to_string(&path)?;
                    // Rows are skipped; only metadata is needed here
                    let table: StoredTable<serde::de::IgnoredAny> = serde_json::from_str(&content)?;
                    infos.push(RelationInfo {
                        relation: table.relation,
                        columns: table.columns,
                        row_count: table.row_count,
                        materialized_at: table.materialized_at,
                    });
                }
            }
        }

        infos.sort_by(|a, b| {
            (&a.relation.schema, &a.relation.name).cmp(&(&b.relation.schema, &b.relation.name))
        });
        Ok(infos)
    }
}

impl Default for Warehouse {
    fn default() -> Self {
        Self::open(DEFAULT_WAREHOUSE_DIR)
    }
}
