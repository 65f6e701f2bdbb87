//! `planpilot map` commands: inspect the persisted sync map.

use std::path::Path;

use anyhow::{Context, Result};

use planpilot_core::syncmap::SyncMap;

use crate::MapCommands;

pub fn run_map_command(command: MapCommands) -> Result<()> {
    match command {
        MapCommands::Show { map } => cmd_show(Path::new(&map)),
    }
}

/// Print the sync map without interpreting it against any plan or
/// target, so it works for inspection regardless of configuration.
fn cmd_show(path: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read sync map at {}", path.display()))?;
    let map: SyncMap = serde_json::from_str(&contents)
        .with_context(|| format!("sync map {} is corrupt", path.display()))?;

    println!("Sync map: {}", path.display());
    println!("  Plan ID:   {}", map.plan_id);
    println!("  Target:    {}", map.target);
    if !map.board_url.is_empty() {
        println!("  Board URL: {}", map.board_url);
    }
    match map.synced_at {
        Some(at) => println!("  Synced at: {at}"),
        None => println!("  Synced at: never (no completed sync)"),
    }
    println!("  Entries:   {}", map.len());
    println!();

    for (item_id, entry) in &map.entries {
        println!(
            "  {:<12} {:<6} {:<8} {}",
            item_id, entry.item_type, entry.key, entry.url
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use planpilot_core::plan::PlanItemType;
    use planpilot_core::syncmap::SyncEntry;

    #[test]
    fn show_reads_a_persisted_map() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("map.json");

        let mut map = SyncMap::empty("abc", "owner/repo", "");
        map.insert(
            "T1".to_owned(),
            SyncEntry {
                remote_id: "rid".to_owned(),
                key: "#1".to_owned(),
                url: "https://tracker.test/items/1".to_owned(),
                item_type: PlanItemType::Task,
            },
        );
        map.persist(&path, false).unwrap();

        cmd_show(&path).unwrap();
    }

    #[test]
    fn show_errors_on_missing_file() {
        let err = cmd_show(Path::new("/nonexistent/map.json")).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read"));
    }
}
