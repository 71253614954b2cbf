use super::with_engine;
use crate::output::{print_json, print_table};
use ordersync_core::OrderId;
use std::path::Path;

pub fn history(config_path: &Path, id: OrderId, json: bool) -> anyhow::Result<()> {
    let entries = with_engine(config_path, |engine| async move {
        Ok::<_, anyhow::Error>(engine.history(id).await?)
    })?;

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No history for order {id}.");
        return Ok(());
    }
    let rows = entries
        .iter()
        .map(|e| {
            vec![
                e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                e.previous.map_or_else(|| "-".to_string(), |s| s.to_string()),
                e.status.to_string(),
            ]
        })
        .collect();
    print_table(&["TIMESTAMP", "PREVIOUS", "STATUS"], rows);
    Ok(())
}

pub fn stats(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let stats = with_engine(config_path, |engine| async move {
        Ok::<_, anyhow::Error>(engine.mirror_stats().await?)
    })?;

    if json {
        return print_json(&stats);
    }
    println!("Tracked orders: {}", stats.total_tracked);
    if stats.by_status.is_empty() {
        return Ok(());
    }
    println!();
    let rows = stats
        .by_status
        .iter()
        .map(|(status, count)| vec![status.to_string(), count.to_string()])
        .collect();
    print_table(&["STATUS", "COUNT"], rows);
    Ok(())
}
