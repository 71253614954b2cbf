use super::{ctrl_c_token, with_engine};
use crate::output::{print_json, print_table};
use ordersync_core::{ConsistencyReport, Verdict};
use std::path::Path;

pub fn run(config_path: &Path, strict: bool, json: bool) -> anyhow::Result<()> {
    let report = with_engine(config_path, |engine| async move {
        let cancel = ctrl_c_token();
        Ok::<_, anyhow::Error>(engine.check_all_with(&cancel).await?)
    })?;

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if strict && report.verdict == Verdict::Inconsistent {
        anyhow::bail!("{} discrepancies found", report.discrepancies_found);
    }
    Ok(())
}

fn print_report(report: &ConsistencyReport) {
    println!("Orders checked:  {}", report.total_orders);
    println!("Discrepancies:   {}", report.discrepancies_found);
    println!("Consistency:     {:.1}%", report.consistency_percentage);
    println!(
        "Verdict:         {}",
        match report.verdict {
            Verdict::Consistent => "CONSISTENT",
            Verdict::Inconsistent => "INCONSISTENT",
        }
    );

    if report.discrepancies.is_empty() {
        return;
    }
    println!();
    let rows = report
        .discrepancies
        .iter()
        .map(|d| {
            vec![
                d.order_id.to_string(),
                d.authoritative.to_string(),
                d.mirrored.to_string(),
            ]
        })
        .collect();
    print_table(&["ORDER", "AUTHORITATIVE", "MIRRORED"], rows);
}
