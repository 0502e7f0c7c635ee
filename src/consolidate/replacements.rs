use crate::storage::SqliteStorage;
use rusqlite::{params, OptionalExtension};

/// An annotation row left in place because no real part precedes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmergedReplacement {
    pub id: i64,
    pub part_number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplacementReport {
    pub merged: usize,
    pub unmerged: Vec<UnmergedReplacement>,
}

/// Folds replacement annotation rows into the part they follow
///
/// An annotation row has no PNC, description, or ref number. Its part
/// number is copied into `replacement_part_number` of the nearest earlier
/// row (by id) that has a PNC, and the annotation row is deleted. Rows with
/// no such predecessor are kept and returned in `unmerged`.
pub fn merge_replacement_parts(storage: &mut SqliteStorage) -> crate::Result<ReplacementReport> {
    let annotations: Vec<(i64, String)> = {
        let mut stmt = storage.conn().prepare(
            "SELECT id, part_number FROM parts
             WHERE pnc IS NULL AND description IS NULL AND ref_number IS NULL
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut report = ReplacementReport::default();

    for (id, part_number) in annotations {
        let tx = storage.conn_mut().transaction()?;
        let target: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, part_number FROM parts
                 WHERE id < ?1 AND pnc IS NOT NULL
                 ORDER BY id DESC LIMIT 1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match target {
            Some((target_id, target_number)) => {
                tx.execute(
                    "UPDATE parts SET replacement_part_number = ?1 WHERE id = ?2",
                    params![part_number, target_id],
                )?;
                tx.execute("DELETE FROM parts WHERE id = ?1", params![id])?;
                tx.commit()?;
                tracing::debug!("{} replaced by {}", target_number, part_number);
                report.merged += 1;
            }
            None => {
                tracing::warn!(
                    "Replacement row {} ({}) has no preceding part; left unmerged",
                    id,
                    part_number
                );
                report.unmerged.push(UnmergedReplacement { id, part_number });
            }
        }
    }

    if report.merged > 0 || !report.unmerged.is_empty() {
        tracing::info!(
            "Merged {} replacement rows, {} unmerged",
            report.merged,
            report.unmerged.len()
        );
    }
    Ok(report)
}
