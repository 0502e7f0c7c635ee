use super::merge_diagram_into;
use crate::storage::SqliteStorage;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagramReport {
    /// Non-canonical diagrams deleted
    pub merged: usize,
    /// Parts re-pointed to a canonical diagram
    pub parts_moved: usize,
    /// Parts deleted because their part number was already under the canonical diagram
    pub parts_dropped: usize,
}

/// Collapses diagrams that share an `image_path` into one
///
/// The lexicographically smallest id survives. Each image path group is
/// merged in its own transaction.
pub fn dedupe_diagrams(storage: &mut SqliteStorage) -> crate::Result<DiagramReport> {
    let groups: BTreeMap<String, Vec<String>> = {
        let mut stmt = storage.conn().prepare(
            "SELECT image_path, id FROM diagrams
             WHERE image_path IN (
                 SELECT image_path FROM diagrams
                 WHERE image_path IS NOT NULL
                 GROUP BY image_path
                 HAVING COUNT(*) > 1
             )
             ORDER BY image_path, id",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (image_path, id) in rows {
            groups.entry(image_path).or_default().push(id);
        }
        groups
    };

    let mut report = DiagramReport::default();

    for (image_path, mut ids) in groups {
        ids.sort();
        let Some((canonical, duplicates)) = ids.split_first() else {
            continue;
        };

        let tx = storage.conn_mut().transaction()?;
        for duplicate in duplicates {
            let (dropped, moved) = merge_diagram_into(&tx, duplicate, canonical)?;
            report.parts_dropped += dropped;
            report.parts_moved += moved;
            report.merged += 1;
        }
        tx.commit()?;

        tracing::debug!(
            "Kept diagram {} for {} ({} duplicates)",
            canonical,
            image_path,
            duplicates.len()
        );
    }

    if report.merged > 0 {
        tracing::info!(
            "Merged {} duplicate diagrams: {} parts moved, {} duplicate parts dropped",
            report.merged,
            report.parts_moved,
            report.parts_dropped
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Part;
    use crate::consolidate::test_support::*;
    use crate::storage::Storage;

    #[test]
    fn test_merges_diagrams_sharing_an_image() {
        let mut storage = storage();
        add_diagram(&mut storage, "engine/assy/b", Some("images/head.png"));
        add_diagram(&mut storage, "engine/assy/a", Some("images/head.png"));
        add_diagram(&mut storage, "engine/assy/c", Some("images/other.png"));

        add_part(&mut storage, "engine/assy/a", "MD1", Some("11010"));
        add_part(&mut storage, "engine/assy/b", "MD1", Some("11010"));
        add_part(&mut storage, "engine/assy/b", "MD2", Some("11020"));

        let report = dedupe_diagrams(&mut storage).unwrap();
        assert_eq!(
            report,
            DiagramReport {
                merged: 1,
                parts_moved: 1,
                parts_dropped: 1,
            }
        );

        assert!(storage.get_diagram("engine/assy/b").unwrap().is_none());
        assert!(storage.get_diagram("engine/assy/c").unwrap().is_some());
        assert_eq!(part_numbers(&storage, "engine/assy/a"), vec!["MD1", "MD2"]);

        let paths = storage
            .execute_query(
                "SELECT image_path, COUNT(*) FROM diagrams GROUP BY image_path HAVING COUNT(*) > 1",
            )
            .unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn test_no_orphaned_parts_after_merge() {
        let mut storage = storage();
        for id in ["d1", "d2", "d3"] {
            add_diagram(&mut storage, id, Some("images/shared.png"));
            add_part(&mut storage, id, "MD1", Some("11010"));
            add_part(&mut storage, id, &format!("MD-{id}"), Some("11020"));
        }

        dedupe_diagrams(&mut storage).unwrap();

        let orphans = storage
            .execute_query(
                "SELECT p.id FROM parts p LEFT JOIN diagrams d ON p.diagram_id = d.id WHERE d.id IS NULL",
            )
            .unwrap();
        assert!(orphans.is_empty());
        assert_eq!(
            part_numbers(&storage, "d1"),
            vec!["MD1", "MD-d1", "MD-d2", "MD-d3"]
        );
    }

    #[test]
    fn test_repeated_part_number_within_duplicate_is_collapsed() {
        let mut storage = storage();
        add_diagram(&mut storage, "a", Some("images/shared.png"));
        add_diagram(&mut storage, "b", Some("images/shared.png"));
        add_part(&mut storage, "a", "MD1", Some("11010"));
        add_part(&mut storage, "b", "MD2", Some("11020"));

        // Same part number on a second detail page of the same diagram
        let second = Part {
            detail_page_id: Some("2".to_string()),
            part_number: "MD2".to_string(),
            pnc: Some("11020".to_string()),
            diagram_id: "b".to_string(),
            group_id: "engine".to_string(),
            subgroup_id: Some("engine/assy".to_string()),
            ..Part::default()
        };
        assert!(storage.insert_part(&second).unwrap());

        let report = dedupe_diagrams(&mut storage).unwrap();
        assert_eq!(report.merged, 1);
        assert_eq!(report.parts_dropped, 1);
        assert_eq!(report.parts_moved, 1);
        assert_eq!(part_numbers(&storage, "a"), vec!["MD1", "MD2"]);

        let collisions = storage
            .execute_query(
                "SELECT diagram_id, part_number FROM parts
                 GROUP BY diagram_id, part_number HAVING COUNT(*) > 1",
            )
            .unwrap();
        assert!(collisions.is_empty());
    }

    #[test]
    fn test_rerun_is_noop() {
        let mut storage = storage();
        add_diagram(&mut storage, "d1", Some("images/shared.png"));
        add_diagram(&mut storage, "d2", Some("images/shared.png"));
        dedupe_diagrams(&mut storage).unwrap();
        assert_eq!(dedupe_diagrams(&mut storage).unwrap(), DiagramReport::default());
    }
}
