//! Operator-mode CLI handlers for `planpilot plan` subcommands.
//!
//! Implements:
//! - `planpilot plan validate <file>` -- structural + relational checks
//! - `planpilot plan id <file>`       -- print the plan fingerprint
//! - `planpilot plan render <file> <item-id>` -- preview a rendered body
//! - `planpilot plan rollup <file>`   -- show derived blocked-by edges

use std::path::Path;

use anyhow::{Context, Result};

use planpilot_core::plan::{
    compute_plan_id, declared_edges, load_plan_file, parent_blocked_by, rollup_edges,
    validate_plan, Plan, PlanItemType, ValidateMode,
};
use planpilot_core::render::{BodyRenderer, ItemRef, MarkdownRenderer, RenderContext};

use crate::PlanCommands;

/// Dispatch a `PlanCommands` variant to the appropriate handler.
pub fn run_plan_command(command: PlanCommands) -> Result<()> {
    match command {
        PlanCommands::Validate { file, partial } => cmd_validate(Path::new(&file), partial),
        PlanCommands::Id { file } => cmd_id(Path::new(&file)),
        PlanCommands::Render { file, item_id } => cmd_render(Path::new(&file), &item_id),
        PlanCommands::Rollup { file } => cmd_rollup(Path::new(&file)),
    }
}

/// Load a plan file and run relational validation in the given mode.
fn load_validated(path: &Path, mode: ValidateMode) -> Result<Plan> {
    let plan_toml = load_plan_file(path)
        .with_context(|| format!("failed to load plan file: {}", path.display()))?;
    let plan = plan_toml.into_plan();
    validate_plan(&plan, mode)?;
    Ok(plan)
}

fn cmd_validate(path: &Path, partial: bool) -> Result<()> {
    let mode = if partial {
        ValidateMode::Partial
    } else {
        ValidateMode::Strict
    };
    let plan = load_validated(path, mode)?;

    println!("Plan is valid ({mode} mode).");
    println!();
    println!("  Items:   {}", plan.len());
    println!(
        "  Epics:   {}",
        plan.items_of_type(PlanItemType::Epic).count()
    );
    println!(
        "  Stories: {}",
        plan.items_of_type(PlanItemType::Story).count()
    );
    println!(
        "  Tasks:   {}",
        plan.items_of_type(PlanItemType::Task).count()
    );
    println!("  Plan ID: {}", compute_plan_id(&plan));
    Ok(())
}

fn cmd_id(path: &Path) -> Result<()> {
    // The fingerprint is content-addressed, so even a partial slice has
    // one; validate leniently.
    let plan = load_validated(path, ValidateMode::Partial)?;
    println!("{}", compute_plan_id(&plan));
    Ok(())
}

fn cmd_render(path: &Path, item_id: &str) -> Result<()> {
    let plan = load_validated(path, ValidateMode::Strict)?;
    let item = plan
        .item(item_id)
        .with_context(|| format!("item {item_id:?} not found in plan"))?;

    // No sync map here: related items are previewed under their plan
    // ids instead of remote keys.
    let preview_ref = |id: &str| -> Option<ItemRef> {
        plan.item(id).map(|related| ItemRef {
            id: id.to_owned(),
            key: id.to_owned(),
            title: related.title.clone(),
        })
    };
    let ctx = RenderContext {
        plan_id: compute_plan_id(&plan),
        parent: item.parent_id.as_deref().and_then(preview_ref),
        sub_items: item
            .sub_item_ids
            .iter()
            .filter_map(|id| preview_ref(id))
            .collect(),
        depends_on: item
            .depends_on
            .iter()
            .filter_map(|id| preview_ref(id))
            .collect(),
    };

    print!("{}", MarkdownRenderer::new().render(item, &ctx));
    Ok(())
}

fn cmd_rollup(path: &Path) -> Result<()> {
    let plan = load_validated(path, ValidateMode::Strict)?;

    let task_edges = declared_edges(&plan.items, PlanItemType::Task);
    let mut story_edges = declared_edges(&plan.items, PlanItemType::Story);
    story_edges.extend(parent_blocked_by(&plan.items, PlanItemType::Story));
    let epic_edges = rollup_edges(&plan.items, &story_edges);

    println!("Task-level dependencies: {}", task_edges.len());
    for (blocked, blocking) in &task_edges {
        println!("  {blocked} blocked by {blocking}");
    }
    println!();
    println!("Story-level blocked-by edges: {}", story_edges.len());
    for (blocked, blocking) in &story_edges {
        println!("  {blocked} blocked by {blocking}");
    }
    println!();
    println!("Epic-level blocked-by edges: {}", epic_edges.len());
    for (blocked, blocking) in &epic_edges {
        println!("  {blocked} blocked by {blocking}");
    }
    Ok(())
}
