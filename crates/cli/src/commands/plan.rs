//! `navpilot plan` — Run a toolset plan from a TOML or JSON file.

use super::run::print_report;
use super::session::Session;
use navpilot_config::AppConfig;
use navpilot_core::{Error, ToolsetPlan};
use std::path::{Path, PathBuf};

pub async fn run(file: PathBuf, surface: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let plan = load_plan(&file)?;
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("📋 {} ({} steps)", plan.description, plan.steps.len());

    let session = Session::start(&config, surface, None).await?;
    let result = session.agent.run_plan(&plan).await;
    session.finish().await;

    let report = result?;
    for (step, step_report) in plan.steps.iter().zip(&report.steps) {
        println!("  ── {} ──", step.tool_id);
        print_report(step_report);
    }
    Ok(())
}

/// Parse a plan file, choosing the format by extension.
pub fn load_plan(path: &Path) -> navpilot_core::Result<ToolsetPlan> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("failed to read plan {}: {e}", path.display()),
    })?;

    let plan: ToolsetPlan = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        _ => toml::from_str(&content).map_err(|e| Error::Config {
            message: format!("invalid plan {}: {e}", path.display()),
        })?,
    };

    if plan.steps.is_empty() {
        return Err(Error::Config {
            message: format!("plan {} has no steps", path.display()),
        });
    }
    Ok(plan)
}
