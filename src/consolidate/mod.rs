//! Consolidation passes
//!
//! Batch repairs for duplication that idempotent upserts cannot prevent:
//! numeric-suffixed identifiers, boilerplate in names, duplicate image files,
//! several diagrams sharing one image, and replacement annotation rows.
//!
//! Every pass is idempotent and commits each affected row-group in its own
//! transaction, so an interrupted pass never leaves a part pointing at a
//! deleted diagram.

mod diagrams;
mod identifiers;
mod images;
mod names;
mod replacements;

pub use diagrams::{dedupe_diagrams, DiagramReport};
pub use identifiers::{normalize_diagram_ids, IdentifierReport};
pub use images::{dedupe_image_files, image_path_for, ImageReport};
pub use names::{clean_names, NameReport};
pub use replacements::{merge_replacement_parts, ReplacementReport, UnmergedReplacement};

use crate::catalog::NameNormalizer;
use crate::storage::SqliteStorage;
use rusqlite::{params, Transaction};
use std::path::Path;

/// Combined outcome of [`run_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidationReport {
    pub identifiers: IdentifierReport,
    pub names: NameReport,
    pub images: ImageReport,
    pub diagrams: DiagramReport,
    pub replacements: ReplacementReport,
}

/// Runs every pass in the recommended order
///
/// Identifiers and names first, then image files before diagrams (so
/// diagrams sharing a renamed file end up with equal paths), and the
/// replacement merge last.
pub fn run_all(
    storage: &mut SqliteStorage,
    images_dir: &Path,
    names: &dyn NameNormalizer,
) -> crate::Result<ConsolidationReport> {
    let identifiers = normalize_diagram_ids(storage)?;
    let names = clean_names(storage, names)?;
    let images = dedupe_image_files(storage, images_dir)?;
    let diagrams = dedupe_diagrams(storage)?;
    let replacements = merge_replacement_parts(storage)?;

    Ok(ConsolidationReport {
        identifiers,
        names,
        images,
        diagrams,
        replacements,
    })
}

/// Folds diagram `from` into diagram `into`
///
/// Parts of `from` whose part number already exists under `into` are
/// deleted, as are repeats of one part number within `from` (the lowest id
/// stays). The rest are re-pointed, then `from` is deleted. Returns
/// `(dropped, moved)` part counts.
fn merge_diagram_into(tx: &Transaction<'_>, from: &str, into: &str) -> rusqlite::Result<(usize, usize)> {
    let colliding = tx.execute(
        "DELETE FROM parts
         WHERE diagram_id = ?1
           AND part_number IN (SELECT part_number FROM parts WHERE diagram_id = ?2)",
        params![from, into],
    )?;
    let repeated = tx.execute(
        "DELETE FROM parts
         WHERE diagram_id = ?1
           AND id NOT IN (SELECT MIN(id) FROM parts WHERE diagram_id = ?1 GROUP BY part_number)",
        params![from],
    )?;
    let dropped = colliding + repeated;
    let moved = tx.execute(
        "UPDATE parts SET diagram_id = ?2 WHERE diagram_id = ?1",
        params![from, into],
    )?;
    tx.execute("DELETE FROM diagrams WHERE id = ?1", params![from])?;
    Ok((dropped, moved))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::catalog::{Diagram, Part, Subgroup};
    use crate::storage::{SqliteStorage, Storage};

    pub fn storage() -> SqliteStorage {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .insert_subgroup(&Subgroup {
                id: "engine/assy".to_string(),
                name: "Engine Assy".to_string(),
                group_id: "engine".to_string(),
                path: "engine/assy".to_string(),
            })
            .unwrap();
        storage
    }

    pub fn add_diagram(storage: &mut SqliteStorage, id: &str, image_path: Option<&str>) {
        storage
            .insert_diagram(&Diagram {
                id: id.to_string(),
                group_id: "engine".to_string(),
                subgroup_id: Some("engine/assy".to_string()),
                name: id.to_string(),
                image_url: Some(format!("https://cdn.example.com/{id}.png")),
                image_path: image_path.map(String::from),
                source_url: "https://parts.example.com/cat/engine/assy/".to_string(),
            })
            .unwrap();
    }

    pub fn add_part(storage: &mut SqliteStorage, diagram_id: &str, number: &str, pnc: Option<&str>) {
        let inserted = storage
            .insert_part(&Part {
                detail_page_id: Some("1".to_string()),
                part_number: number.to_string(),
                pnc: pnc.map(String::from),
                description: pnc.map(|_| format!("PART {number}")),
                ref_number: pnc.map(|_| "1".to_string()),
                diagram_id: diagram_id.to_string(),
                group_id: "engine".to_string(),
                subgroup_id: Some("engine/assy".to_string()),
                ..Part::default()
            })
            .unwrap();
        assert!(inserted, "fixture part {number} on {diagram_id} was a duplicate");
    }

    pub fn part_numbers(storage: &SqliteStorage, diagram_id: &str) -> Vec<String> {
        storage
            .parts_for_diagram(diagram_id)
            .unwrap()
            .into_iter()
            .map(|p| p.part.part_number)
            .collect()
    }
}
