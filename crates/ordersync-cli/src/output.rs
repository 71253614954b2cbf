use ordersync_core::oplog::{LogKind, OperationLogEntry};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    print!("{}", render_table(headers, &rows));
}

/// Left-aligned columns two spaces apart, with a dashed rule under the
/// header. Cells beyond the header count are dropped.
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let widths: Vec<usize> = (0..headers.len())
        .map(|col| {
            rows.iter()
                .filter_map(|row| row.get(col))
                .map(|cell| cell.chars().count())
                .fold(headers[col].len(), usize::max)
        })
        .collect();

    let mut out = table_line(headers.iter().copied(), &widths);
    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    out.push_str(&table_line(rule.iter().map(String::as_str), &widths));
    for row in rows {
        out.push_str(&table_line(row.iter().map(String::as_str), &widths));
    }
    out
}

fn table_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &w)| format!("{cell:<w$}"))
        .collect();
    format!("{}\n", padded.join("  ").trim_end())
}

/// Print operation log entries oldest first, so the last line is the most
/// recent action.
pub fn print_log(entries: &[OperationLogEntry]) {
    if entries.is_empty() {
        return;
    }
    println!();
    for entry in entries.iter().rev() {
        let tag = match entry.kind {
            LogKind::Success => "ok  ",
            LogKind::Failure => "FAIL",
            LogKind::Info => "info",
        };
        println!(
            "[{}] {tag} {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.message
        );
    }
}
