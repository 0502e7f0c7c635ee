//! Plain-text rendering of ad hoc queries and part searches

use crate::catalog::PartRecord;
use crate::storage::{DisplayValue, QueryResult};

/// Widest a column is allowed to grow before values are cut
const MAX_COLUMN_WIDTH: usize = 48;

/// Renders a query result as an aligned text table
pub fn format_query_result(result: &QueryResult) -> String {
    if result.columns.is_empty() {
        return "(no columns)\n".to_string();
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| truncate(&DisplayValue(v).to_string()))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = result
        .columns
        .iter()
        .map(|c| truncate(c).chars().count())
        .collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let mut out = String::new();
    let header: Vec<String> = result.columns.iter().map(|c| truncate(c)).collect();
    push_row(&mut out, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(&mut out, &rule, &widths);
    for row in &cells {
        push_row(&mut out, row, &widths);
    }
    out.push_str(&format!(
        "({} row{})\n",
        result.rows.len(),
        if result.rows.len() == 1 { "" } else { "s" }
    ));
    out
}

pub fn print_query_result(result: &QueryResult) {
    print!("{}", format_query_result(result));
}

/// Prints full-text search hits, best match first
pub fn print_search_results(query: &str, parts: &[PartRecord]) {
    println!("Search \"{}\": {} parts\n", query, parts.len());
    for record in parts {
        let part = &record.part;
        println!(
            "  {:<16} {:<8} {}",
            part.part_number,
            part.pnc.as_deref().unwrap_or("-"),
            part.description.as_deref().unwrap_or("")
        );
        println!("  {:<16} diagram {}", "", part.diagram_id);
        if let Some(replacement) = &part.replacement_part_number {
            println!("  {:<16} replaced by {}", "", replacement);
        }
    }
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect();
    out.push_str(line.join(" | ").trim_end());
    out.push('\n');
}

fn truncate(value: &str) -> String {
    if value.chars().count() <= MAX_COLUMN_WIDTH {
        return value.to_string();
    }
    let mut cut: String = value.chars().take(MAX_COLUMN_WIDTH - 1).collect();
    cut.push('…');
    cut
}
