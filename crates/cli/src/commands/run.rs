//! `navpilot run` — Drive a surface toward a single goal.

use super::session::Session;
use navpilot_agent::RunReport;
use navpilot_config::AppConfig;

pub async fn run(
    goal: String,
    surface: Option<String>,
    max_iterations: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let session = Session::start(&config, surface, max_iterations).await?;
    let result = session.agent.run(goal.as_str()).await;
    session.finish().await;

    let report = result?;
    print_report(&report);
    Ok(())
}

pub fn print_report(report: &RunReport) {
    println!();
    if report.relevant_data.is_empty() {
        println!("  Goal met at {} (no data reported)", report.final_location);
    } else {
        for datum in &report.relevant_data {
            println!("  {}: {}", datum.label, datum.value);
        }
    }
    println!();
}
