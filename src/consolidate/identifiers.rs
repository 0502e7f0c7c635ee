use super::merge_diagram_into;
use crate::catalog::normalize_identifier;
use crate::storage::SqliteStorage;
use rusqlite::{params, OptionalExtension};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierReport {
    /// Diagrams moved to their normalized id
    pub renamed: usize,
    /// Diagrams folded into an existing diagram that already had the normalized id
    pub merged: usize,
}

/// Strips numeric suffixes from diagram ids
///
/// Parts are re-pointed in the same transaction as the rename. When the
/// normalized id is already taken, the diagram is merged into it with the
/// canonical row winning part-number collisions.
pub fn normalize_diagram_ids(storage: &mut SqliteStorage) -> crate::Result<IdentifierReport> {
    let ids: Vec<String> = {
        let mut stmt = storage.conn().prepare("SELECT id FROM diagrams ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        ids
    };

    let mut report = IdentifierReport::default();

    for old_id in ids {
        let new_id = normalize_identifier(&old_id);
        if new_id == old_id {
            continue;
        }

        let tx = storage.conn_mut().transaction()?;
        let target_exists = tx
            .query_row("SELECT 1 FROM diagrams WHERE id = ?1", params![new_id], |_| Ok(()))
            .optional()?
            .is_some();

        if target_exists {
            let (dropped, moved) = merge_diagram_into(&tx, &old_id, &new_id)?;
            tracing::debug!(
                "Merged diagram {} into {} ({} parts moved, {} dropped)",
                old_id,
                new_id,
                moved,
                dropped
            );
            report.merged += 1;
        } else {
            // Copy, re-point, delete keeps every foreign key valid throughout
            tx.execute(
                "INSERT INTO diagrams (id, group_id, subgroup_id, name, image_url, image_path, source_url)
                 SELECT ?2, group_id, subgroup_id, name, image_url, image_path, source_url
                 FROM diagrams WHERE id = ?1",
                params![old_id, new_id],
            )?;
            tx.execute(
                "UPDATE parts SET diagram_id = ?2 WHERE diagram_id = ?1",
                params![old_id, new_id],
            )?;
            tx.execute("DELETE FROM diagrams WHERE id = ?1", params![old_id])?;
            tracing::debug!("Renamed diagram {} -> {}", old_id, new_id);
            report.renamed += 1;
        }

        tx.commit()?;
    }

    if report.renamed + report.merged > 0 {
        tracing::info!(
            "Normalized diagram ids: {} renamed, {} merged",
            report.renamed,
            report.merged
        );
    }
    Ok(report)
}
