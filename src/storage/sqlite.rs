//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::catalog::{Diagram, Group, Part, PartRecord, Subgroup};
use crate::state::CrawlStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{ProgressRecord, QueryResult};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// Columns selected whenever a full part row is read
const PART_COLUMNS: &str = "p.id, p.detail_page_id, p.part_number, p.pnc, p.description,
    p.ref_number, p.quantity, p.spec, p.notes, p.color, p.model_date_range,
    p.diagram_id, p.group_id, p.subgroup_id, p.replacement_part_number";

const DIAGRAM_COLUMNS: &str =
    "id, group_id, subgroup_id, name, image_url, image_path, source_url";

const INSERT_PART_SQL: &str = "INSERT OR IGNORE INTO parts (
        detail_page_id, part_number, pnc, description, ref_number, quantity, spec,
        notes, color, model_date_range, diagram_id, group_id, subgroup_id,
        replacement_part_number
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`, then creates and migrates the schema
    pub fn new(path: &Path) -> crate::Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Mutable access for passes that need their own transactions
    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Applies a ledger transition, recording unknown URLs as pending first
    fn transition(&mut self, url: &str, next: CrawlStatus, error: Option<&str>) -> StorageResult<()> {
        let current = match self.url_status(url)? {
            Some(record) => record.status,
            None => {
                self.mark_pending(url)?;
                CrawlStatus::Pending
            }
        };

        if !current.can_transition_to(next) {
            return Err(StorageError::InvalidTransition {
                url: url.to_string(),
                from: current,
                to: next,
            });
        }

        self.conn.execute(
            "UPDATE scrape_progress
             SET status = ?1, scraped_at = datetime('now'), error = ?2
             WHERE url = ?3",
            params![next.to_db_string(), error, url],
        )?;
        Ok(())
    }

    fn count(&self, sql: &str, args: impl rusqlite::Params) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, args, |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Maps a row selected with [`PART_COLUMNS`]
fn part_from_row(row: &Row<'_>) -> rusqlite::Result<PartRecord> {
    Ok(PartRecord {
        id: row.get(0)?,
        part: Part {
            detail_page_id: row.get(1)?,
            part_number: row.get(2)?,
            pnc: row.get(3)?,
            description: row.get(4)?,
            ref_number: row.get(5)?,
            quantity: row.get(6)?,
            spec: row.get(7)?,
            notes: row.get(8)?,
            color: row.get(9)?,
            model_date_range: row.get(10)?,
            diagram_id: row.get(11)?,
            group_id: row.get(12)?,
            subgroup_id: row.get(13)?,
            replacement_part_number: row.get(14)?,
        },
    })
}

/// Maps a row selected with [`DIAGRAM_COLUMNS`]
fn diagram_from_row(row: &Row<'_>) -> rusqlite::Result<Diagram> {
    Ok(Diagram {
        id: row.get(0)?,
        group_id: row.get(1)?,
        subgroup_id: row.get(2)?,
        name: row.get(3)?,
        image_url: row.get(4)?,
        image_path: row.get(5)?,
        source_url: row.get(6)?,
    })
}

fn insert_part_on(conn: &Connection, part: &Part) -> rusqlite::Result<usize> {
    conn.execute(
        INSERT_PART_SQL,
        params![
            part.detail_page_id,
            part.part_number,
            part.pnc,
            part.description,
            part.ref_number,
            part.quantity,
            part.spec,
            part.notes,
            part.color,
            part.model_date_range,
            part.diagram_id,
            part.group_id,
            part.subgroup_id,
            part.replacement_part_number,
        ],
    )
}

impl Storage for SqliteStorage {
    // ===== Crawl Progress Ledger =====

    fn mark_pending(&mut self, url: &str) -> StorageResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO scrape_progress (url, status) VALUES (?1, ?2)",
            params![url, CrawlStatus::Pending.to_db_string()],
        )?;
        Ok(inserted > 0)
    }

    fn mark_completed(&mut self, url: &str) -> StorageResult<()> {
        self.transition(url, CrawlStatus::Completed, None)
    }

    fn mark_failed(&mut self, url: &str, error: &str) -> StorageResult<()> {
        self.transition(url, CrawlStatus::Failed, Some(error))
    }

    fn reset_failed(&mut self) -> StorageResult<u64> {
        let reset = self.conn.execute(
            "UPDATE scrape_progress SET status = ?1, error = NULL WHERE status = ?2",
            params![
                CrawlStatus::Pending.to_db_string(),
                CrawlStatus::Failed.to_db_string()
            ],
        )?;
        Ok(reset as u64)
    }

    fn url_status(&self, url: &str) -> StorageResult<Option<ProgressRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT url, status, scraped_at, error FROM scrape_progress WHERE url = ?1",
                params![url],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(url, status, scraped_at, error)| {
            let status =
                CrawlStatus::from_db_string(&status).ok_or(StorageError::UnknownStatus(status))?;
            Ok(ProgressRecord {
                url,
                status,
                scraped_at,
                error,
            })
        })
        .transpose()
    }

    fn urls_by_status(&self, status: CrawlStatus) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url FROM scrape_progress WHERE status = ?1 ORDER BY rowid")?;
        let urls = stmt
            .query_map(params![status.to_db_string()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(urls)
    }

    // ===== Entity Upserts =====

    fn insert_group(&mut self, group: &Group) -> StorageResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO groups (id, name) VALUES (?1, ?2)",
            params![group.id, group.name],
        )?;
        Ok(inserted > 0)
    }

    fn insert_subgroup(&mut self, subgroup: &Subgroup) -> StorageResult<bool> {
        // Ensure the parent exists; an unseen group is named after its id
        self.insert_group(&Group {
            id: subgroup.group_id.clone(),
            name: subgroup.group_id.clone(),
        })?;

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO subgroups (id, name, group_id, path) VALUES (?1, ?2, ?3, ?4)",
            params![subgroup.id, subgroup.name, subgroup.group_id, subgroup.path],
        )?;
        Ok(inserted > 0)
    }

    fn insert_diagram(&mut self, diagram: &Diagram) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO diagrams (id, group_id, subgroup_id, name, image_url, image_path, source_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                group_id = excluded.group_id,
                subgroup_id = excluded.subgroup_id,
                name = excluded.name,
                image_url = excluded.image_url,
                image_path = CASE
                    WHEN diagrams.image_url IS excluded.image_url
                    THEN COALESCE(diagrams.image_path, excluded.image_path)
                    ELSE excluded.image_path
                END,
                source_url = excluded.source_url",
            params![
                diagram.id,
                diagram.group_id,
                diagram.subgroup_id,
                diagram.name,
                diagram.image_url,
                diagram.image_path,
                diagram.source_url,
            ],
        )?;
        Ok(())
    }

    fn insert_part(&mut self, part: &Part) -> StorageResult<bool> {
        Ok(insert_part_on(&self.conn, part)? > 0)
    }

    fn insert_parts(&mut self, parts: &[Part]) -> StorageResult<usize> {
        if parts.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        for part in parts {
            match insert_part_on(&tx, part) {
                Ok(n) => inserted += n,
                Err(e) => tracing::warn!(
                    "Skipping part {} on diagram {}: {}",
                    part.part_number,
                    part.diagram_id,
                    e
                ),
            }
        }
        tx.commit()?;

        Ok(inserted)
    }

    // ===== Entity Reads =====

    fn get_group(&self, id: &str) -> StorageResult<Option<Group>> {
        let group = self
            .conn
            .query_row(
                "SELECT id, name FROM groups WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Group {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(group)
    }

    fn get_subgroup(&self, id: &str) -> StorageResult<Option<Subgroup>> {
        let subgroup = self
            .conn
            .query_row(
                "SELECT id, name, group_id, COALESCE(path, id) FROM subgroups WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Subgroup {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        group_id: row.get(2)?,
                        path: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(subgroup)
    }

    fn get_diagram(&self, id: &str) -> StorageResult<Option<Diagram>> {
        let diagram = self
            .conn
            .query_row(
                &format!("SELECT {DIAGRAM_COLUMNS} FROM diagrams WHERE id = ?1"),
                params![id],
                diagram_from_row,
            )
            .optional()?;
        Ok(diagram)
    }

    fn parts_for_diagram(&self, diagram_id: &str) -> StorageResult<Vec<PartRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PART_COLUMNS} FROM parts p WHERE p.diagram_id = ?1 ORDER BY p.id"
        ))?;
        let parts = stmt
            .query_map(params![diagram_id], part_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts)
    }

    fn parts_exist_for_detail(
        &self,
        detail_page_id: &str,
        subgroup_id: &str,
    ) -> StorageResult<bool> {
        let count = self.count(
            "SELECT COUNT(*) FROM parts WHERE detail_page_id = ?1 AND subgroup_id = ?2",
            params![detail_page_id, subgroup_id],
        )?;
        Ok(count > 0)
    }

    fn diagrams_without_images(&self) -> StorageResult<Vec<Diagram>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DIAGRAM_COLUMNS} FROM diagrams
             WHERE image_url IS NOT NULL AND image_path IS NULL
             ORDER BY id"
        ))?;
        let diagrams = stmt
            .query_map([], diagram_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(diagrams)
    }

    fn set_image_path_if_null(
        &mut self,
        diagram_id: &str,
        image_path: &str,
    ) -> StorageResult<bool> {
        let updated = self.conn.execute(
            "UPDATE diagrams SET image_path = ?1 WHERE id = ?2 AND image_path IS NULL",
            params![image_path, diagram_id],
        )?;
        Ok(updated > 0)
    }

    fn search_parts(&self, query: &str) -> StorageResult<Vec<PartRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PART_COLUMNS} FROM parts p
             JOIN parts_fts ON p.id = parts_fts.rowid
             WHERE parts_fts MATCH ?1
             ORDER BY parts_fts.rank"
        ))?;
        let parts = stmt
            .query_map(params![query], part_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts)
    }

    // ===== Bulk Deletion =====

    fn delete_subgroups_by_path(&mut self, path: &str) -> StorageResult<u64> {
        const MATCHING_SUBGROUPS: &str = "SELECT id FROM subgroups WHERE path = ?1 OR id = ?1";

        let tx = self.conn.transaction()?;

        // Parts reached through a diagram of these subgroups go too, so no
        // surviving part is left pointing at a deleted diagram
        let doomed_parts = format!(
            "SELECT id FROM parts
             WHERE subgroup_id IN ({MATCHING_SUBGROUPS})
                OR diagram_id IN (SELECT id FROM diagrams WHERE subgroup_id IN ({MATCHING_SUBGROUPS}))"
        );

        tx.execute(
            &format!("DELETE FROM tags_to_parts WHERE part_id IN ({doomed_parts})"),
            params![path],
        )?;
        let parts = tx.execute(
            &format!("DELETE FROM parts WHERE id IN ({doomed_parts})"),
            params![path],
        )?;
        let diagrams = tx.execute(
            &format!("DELETE FROM diagrams WHERE subgroup_id IN ({MATCHING_SUBGROUPS})"),
            params![path],
        )?;
        let subgroups = tx.execute(
            "DELETE FROM subgroups WHERE path = ?1 OR id = ?1",
            params![path],
        )?;

        tx.commit()?;

        tracing::info!(
            "Deleted path {}: {} subgroups, {} diagrams, {} parts",
            path,
            subgroups,
            diagrams,
            parts
        );
        Ok(subgroups as u64)
    }

    // ===== Statistics =====

    fn count_urls_by_status(&self, status: CrawlStatus) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM scrape_progress WHERE status = ?1",
            params![status.to_db_string()],
        )
    }

    fn count_groups(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM groups", [])
    }

    fn count_subgroups(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM subgroups", [])
    }

    fn count_diagrams(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM diagrams", [])
    }

    fn count_parts(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM parts", [])
    }

    fn count_diagrams_with_images(&self) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM diagrams WHERE image_path IS NOT NULL",
            [],
        )
    }

    fn execute_query(&self, sql: &str) -> StorageResult<QueryResult> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let width = columns.len();

        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<Result<Vec<_>, _>>()
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(QueryResult { columns, rows })
    }
}
