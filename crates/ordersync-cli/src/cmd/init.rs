use anyhow::Context;
use ordersync_core::config::Config;
use ordersync_core::io;
use std::path::Path;

const SEED_FILE: &str = "orders.yaml";

const SEED_TEMPLATE: &str = "\
# Orders loaded by the memory order store. Example:
#
# - id: 1
#   product: Laptop
#   customer_id: 7
#   address: 1 Main St
#   status: PENDING
[]
";

pub fn run(config_path: &Path) -> anyhow::Result<()> {
    if config_path.exists() {
        println!("  exists:  {}", config_path.display());
    } else {
        Config::starter()
            .save(config_path)
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        println!("  created: {}", config_path.display());
    }

    let seed_path = config_path
        .parent()
        .map(|p| p.join(SEED_FILE))
        .unwrap_or_else(|| SEED_FILE.into());
    if io::write_if_missing(&seed_path, SEED_TEMPLATE.as_bytes())
        .with_context(|| format!("failed to write {}", seed_path.display()))?
    {
        println!("  created: {}", seed_path.display());
    } else {
        println!("  exists:  {}", seed_path.display());
    }

    Ok(())
}
