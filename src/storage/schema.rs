//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the harvest database.

use rusqlite::Connection;
use std::collections::HashSet;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS groups (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subgroups (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    group_id TEXT NOT NULL REFERENCES groups(id),
    path TEXT
);

CREATE INDEX IF NOT EXISTS idx_subgroups_group ON subgroups(group_id);

CREATE TABLE IF NOT EXISTS diagrams (
    id TEXT PRIMARY KEY,
    group_id TEXT NOT NULL REFERENCES groups(id),
    subgroup_id TEXT REFERENCES subgroups(id),
    name TEXT NOT NULL,
    image_url TEXT,
    image_path TEXT,
    source_url TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_diagrams_subgroup ON diagrams(subgroup_id);
CREATE INDEX IF NOT EXISTS idx_diagrams_image_path ON diagrams(image_path);

CREATE TABLE IF NOT EXISTS parts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    detail_page_id TEXT,
    part_number TEXT NOT NULL,
    pnc TEXT,
    description TEXT,
    ref_number TEXT,
    quantity INTEGER,
    spec TEXT,
    notes TEXT,
    color TEXT,
    model_date_range TEXT,
    diagram_id TEXT NOT NULL REFERENCES diagrams(id),
    group_id TEXT NOT NULL REFERENCES groups(id),
    subgroup_id TEXT REFERENCES subgroups(id),
    replacement_part_number TEXT,
    UNIQUE(detail_page_id, part_number, diagram_id)
);

CREATE INDEX IF NOT EXISTS idx_parts_diagram ON parts(diagram_id);
CREATE INDEX IF NOT EXISTS idx_parts_subgroup ON parts(subgroup_id);
CREATE INDEX IF NOT EXISTS idx_parts_part_number ON parts(part_number);

-- Full-text index over the searchable part fields
CREATE VIRTUAL TABLE IF NOT EXISTS parts_fts USING fts5(
    part_number,
    pnc,
    description,
    notes,
    content='parts',
    content_rowid='id'
);

CREATE TRIGGER IF NOT EXISTS parts_fts_insert AFTER INSERT ON parts BEGIN
    INSERT INTO parts_fts(rowid, part_number, pnc, description, notes)
    VALUES (new.id, new.part_number, new.pnc, new.description, new.notes);
END;

CREATE TRIGGER IF NOT EXISTS parts_fts_delete AFTER DELETE ON parts BEGIN
    INSERT INTO parts_fts(parts_fts, rowid, part_number, pnc, description, notes)
    VALUES ('delete', old.id, old.part_number, old.pnc, old.description, old.notes);
END;

CREATE TRIGGER IF NOT EXISTS parts_fts_update AFTER UPDATE ON parts BEGIN
    INSERT INTO parts_fts(parts_fts, rowid, part_number, pnc, description, notes)
    VALUES ('delete', old.id, old.part_number, old.pnc, old.description, old.notes);
    INSERT INTO parts_fts(rowid, part_number, pnc, description, notes)
    VALUES (new.id, new.part_number, new.pnc, new.description, new.notes);
END;

-- Crawl progress ledger
CREATE TABLE IF NOT EXISTS scrape_progress (
    url TEXT PRIMARY KEY,
    status TEXT NOT NULL DEFAULT 'pending',
    scraped_at TEXT,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_scrape_progress_status ON scrape_progress(status);

-- Derived tag index, safe to wipe and rebuild
CREATE TABLE IF NOT EXISTS tags (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tags_to_parts (
    tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    part_id INTEGER NOT NULL REFERENCES parts(id) ON DELETE CASCADE,
    PRIMARY KEY (tag_id, part_id)
);

CREATE INDEX IF NOT EXISTS idx_tags_to_parts_part ON tags_to_parts(part_id);
"#;

/// Diagram columns from earlier layouts that no longer belong on the table
const LEGACY_DIAGRAM_COLUMNS: &[(&str, &str)] = &[
    ("pnc", "idx_diagrams_pnc"),
    ("diagram_group", "idx_diagrams_diagram_group"),
    ("detail_page_id", "idx_diagrams_detail_page_id"),
];

/// Creates every table, index and trigger that does not exist yet
pub fn create_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Brings a database created by an older layout up to date
///
/// Safe to run on every open: each step checks the current table shape first.
pub fn run_migrations(conn: &Connection) -> Result<(), rusqlite::Error> {
    let subgroup_columns = table_columns(conn, "subgroups")?;
    if !subgroup_columns.contains("path") {
        tracing::info!("Migrating: adding subgroups.path");
        conn.execute_batch("ALTER TABLE subgroups ADD COLUMN path TEXT")?;
    }
    let backfilled = conn.execute("UPDATE subgroups SET path = id WHERE path IS NULL", [])?;
    if backfilled > 0 {
        tracing::info!("Migrating: backfilled path for {} subgroups", backfilled);
    }
    conn.execute_batch("CREATE INDEX IF NOT EXISTS idx_subgroups_path ON subgroups(path)")?;

    let part_columns = table_columns(conn, "parts")?;
    if !part_columns.contains("replacement_part_number") {
        tracing::info!("Migrating: adding parts.replacement_part_number");
        conn.execute_batch("ALTER TABLE parts ADD COLUMN replacement_part_number TEXT")?;
    }

    let diagram_columns = table_columns(conn, "diagrams")?;
    for (column, index) in LEGACY_DIAGRAM_COLUMNS {
        if diagram_columns.contains(*column) {
            tracing::info!("Migrating: dropping diagrams.{}", column);
            conn.execute_batch(&format!(
                "DROP INDEX IF EXISTS {index}; ALTER TABLE diagrams DROP COLUMN {column};"
            ))?;
        }
    }

    Ok(())
}

/// Initializes the schema and applies migrations
pub fn initialize_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    create_schema(conn)?;
    run_migrations(conn)
}

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(columns)
}
