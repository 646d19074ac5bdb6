use anyhow::Result;

use crate::scenarios::scenario_manager;

pub fn list() -> Result<()> {
    for group in scenario_manager().groups() {
        for name in group.scenario_names() {
            println!("{}::{}", group.name(), name);
        }
    }

    Ok(())
}
