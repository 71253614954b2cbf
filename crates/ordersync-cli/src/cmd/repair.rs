use super::{ctrl_c_token, with_engine};
use crate::output::{print_json, print_log};
use ordersync_core::{
    BulkOutcome, CreateOutcome, OrderId, Reconciler, RepairOutcome, SyncOutcome,
};
use serde::Serialize;
use std::path::Path;

/// Print `value` as JSON, or the log entries this invocation produced.
fn report<T: Serialize>(engine: &Reconciler, value: &T, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(value)
    } else {
        print_log(&engine.log_entries());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// repair
// ---------------------------------------------------------------------------

pub fn repair(config_path: &Path, id: OrderId, json: bool) -> anyhow::Result<()> {
    with_engine(config_path, |engine| async move {
        let outcome = engine.repair(id).await?;
        report(&engine, &outcome, json)?;
        match outcome {
            RepairOutcome::Repaired { .. } => Ok(()),
            RepairOutcome::OrderNotFound { .. } => anyhow::bail!("order {id} not found"),
            RepairOutcome::WriteConflict { .. } => {
                anyhow::bail!("concurrent write to the mirror for order {id}; retry")
            }
        }
    })
}

// ---------------------------------------------------------------------------
// repair-all
// ---------------------------------------------------------------------------

pub fn repair_all(config_path: &Path, json: bool) -> anyhow::Result<()> {
    with_engine(config_path, |engine| async move {
        let cancel = ctrl_c_token();
        let result = engine.repair_all_with(&cancel).await;
        // A cancelled run still wrote some entries; show what happened.
        if result.is_err() && !json {
            print_log(&engine.log_entries());
        }
        let result = result?;
        report(&engine, &result, json)?;
        if result.outcome == BulkOutcome::PartialFailure {
            anyhow::bail!(
                "{} of {} orders could not be mirrored",
                result.failed.len(),
                result.failed.len() + result.succeeded.len()
            );
        }
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// sync-from-mirror
// ---------------------------------------------------------------------------

pub fn sync_from_mirror(config_path: &Path, id: OrderId, json: bool) -> anyhow::Result<()> {
    with_engine(config_path, |engine| async move {
        let outcome = engine.sync_from_mirror(id).await?;
        report(&engine, &outcome, json)?;
        match outcome {
            SyncOutcome::Synced { .. } => Ok(()),
            SyncOutcome::MirrorAbsent { .. } => anyhow::bail!("order {id} is not tracked"),
            SyncOutcome::OrderNotFound { .. } => anyhow::bail!("order {id} not found"),
        }
    })
}

// ---------------------------------------------------------------------------
// create-mirror
// ---------------------------------------------------------------------------

pub fn create_mirror(config_path: &Path, id: OrderId, json: bool) -> anyhow::Result<()> {
    with_engine(config_path, |engine| async move {
        let outcome = engine.create_mirror(id).await?;
        report(&engine, &outcome, json)?;
        match outcome {
            CreateOutcome::Created { .. } | CreateOutcome::AlreadyTracked { .. } => Ok(()),
            CreateOutcome::OrderNotFound { .. } => anyhow::bail!("order {id} not found"),
            CreateOutcome::WriteConflict { .. } => {
                anyhow::bail!("concurrent write to the mirror for order {id}; retry")
            }
        }
    })
}
