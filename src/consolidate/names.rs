use crate::catalog::NameNormalizer;
use crate::storage::SqliteStorage;
use rusqlite::params;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameReport {
    pub subgroups: usize,
    pub diagrams: usize,
}

/// Rewrites subgroup and diagram names through the name normalizer
pub fn clean_names(
    storage: &mut SqliteStorage,
    names: &dyn NameNormalizer,
) -> crate::Result<NameReport> {
    let report = NameReport {
        subgroups: clean_table(storage, names, "subgroups")?,
        diagrams: clean_table(storage, names, "diagrams")?,
    };

    if report.subgroups + report.diagrams > 0 {
        tracing::info!(
            "Cleaned names: {} subgroups, {} diagrams",
            report.subgroups,
            report.diagrams
        );
    }
    Ok(report)
}

fn clean_table(
    storage: &mut SqliteStorage,
    names: &dyn NameNormalizer,
    table: &str,
) -> crate::Result<usize> {
    let tx = storage.conn_mut().transaction()?;

    let rows: Vec<(String, String)> = {
        let mut stmt = tx.prepare(&format!("SELECT id, name FROM {table} ORDER BY id"))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut updated = 0;
    for (id, name) in rows {
        let cleaned = names.clean(&name);
        if cleaned != name {
            tracing::debug!("{}: \"{}\" -> \"{}\"", table, name, cleaned);
            tx.execute(
                &format!("UPDATE {table} SET name = ?1 WHERE id = ?2"),
                params![cleaned, id],
            )?;
            updated += 1;
        }
    }

    tx.commit()?;
    Ok(updated)
}
