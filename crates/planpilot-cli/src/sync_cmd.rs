//! `planpilot sync` command: run the engine against the configured
//! provider.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;

use planpilot_core::engine::{
    SyncEngine, SyncEvent, SyncMode, SyncObserver, SyncOptions, SyncReport,
};
use planpilot_core::plan::{load_plan_file, validate_plan, ValidateMode};
use planpilot_core::provider::{MemoryProvider, Provider, ProviderRegistry};
use planpilot_core::render::MarkdownRenderer;

use crate::config::PilotConfig;

/// Observer that forwards engine progress to the structured log.
struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::PhaseStarted { phase, total } => match total {
                Some(total) => tracing::info!(%phase, total, "phase started"),
                None => tracing::info!(%phase, "phase started"),
            },
            SyncEvent::ItemCompleted { phase, item_id } => {
                tracing::info!(%phase, item_id = %item_id, "item done");
            }
            SyncEvent::PhaseCompleted { phase } => tracing::info!(%phase, "phase complete"),
            SyncEvent::PhaseFailed { phase, message } => {
                tracing::error!(%phase, message = %message, "phase failed");
            }
        }
    }
}

/// Build the provider registry for this invocation.
///
/// The memory backend rehearses a sync against process-local state; a
/// real tracker backend registers here the same way. The resolved auth
/// token is handed to backends that need one (memory does not).
fn build_registry(config: &PilotConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(MemoryProvider::new(if config.board_url.is_empty() {
        "memory://tracker"
    } else {
        config.board_url.as_str()
    }));
    registry
}

/// Run the sync command.
pub async fn run_sync(
    config: &PilotConfig,
    plan_file: &str,
    map_path: &str,
    map_sync: bool,
    dry_run: bool,
    max_in_flight: usize,
) -> Result<()> {
    // 1. Load and validate the plan; reconciliation never starts on a
    // broken plan.
    let plan_toml = load_plan_file(std::path::Path::new(plan_file))
        .with_context(|| format!("failed to load plan file: {plan_file}"))?;
    let plan_name = plan_toml.plan.name.clone();
    let plan = plan_toml.into_plan();
    validate_plan(&plan, ValidateMode::Strict)?;

    // 2. Resolve the provider.
    let mut registry = build_registry(config);
    let Some(provider) = registry.take(&config.provider) else {
        bail!(
            "unknown provider {:?}; available: {}",
            config.provider,
            build_registry(config).list().join(", ")
        );
    };
    let provider: Arc<dyn Provider> = Arc::from(provider);

    if config.provider == "memory"
        && !dry_run
        && !map_sync
        && std::path::Path::new(map_path).exists()
    {
        tracing::warn!(
            "the memory backend starts empty each run; an existing sync map may reference \
             items that no longer exist (use --dry-run or point --map at a fresh path)"
        );
    }

    println!("Syncing plan: {plan_name}");
    println!("  Provider:      {}", config.provider);
    println!("  Target:        {}", config.target);
    println!("  Items:         {}", plan.len());
    println!("  Max in flight: {max_in_flight}");
    if dry_run {
        println!("  Mode:          dry run (no remote mutations)");
    }

    // 3. Build the engine.
    let mut options = SyncOptions::new(map_path, &config.target);
    options.board_url = config.board_url.clone();
    options.max_in_flight = max_in_flight;
    options.dry_run = dry_run;
    options.mode = if map_sync {
        SyncMode::MapSync
    } else {
        SyncMode::Normal
    };

    let engine = SyncEngine::new(provider, Arc::new(MarkdownRenderer::new()), options)
        .with_observer(Arc::new(TracingObserver));

    // 4. Graceful shutdown: first signal cancels, second force-exits.
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let got_first_signal = Arc::new(AtomicBool::new(false));
    let got_first_clone = Arc::clone(&got_first_signal);

    tokio::spawn(async move {
        loop {
            tokio::signal::ctrl_c().await.ok();
            if got_first_clone.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                std::process::exit(130);
            }
            eprintln!("\nShutting down gracefully (Ctrl+C again to force)...");
            cancel_clone.cancel();
        }
    });

    // 5. Run.
    let report = engine.sync(&plan, cancel).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &SyncReport) {
    println!();
    if report.dry_run {
        println!("Dry run complete (planned mutations only).");
    } else if report.noop {
        println!("Already in sync; nothing to do.");
    } else {
        println!("Sync complete.");
    }
    println!();
    println!("  Plan ID:            {}", report.plan_id);
    println!("  Existing items:     {}", report.discovered);
    println!("  Created:            {}", report.created);
    println!("  Enriched:           {}", report.enriched);
    println!("  Relations applied:  {}", report.relations_applied);
    println!("  Relations skipped:  {}", report.relations_skipped);
    println!("  Sync map:           {}", report.map_path.display());
}
