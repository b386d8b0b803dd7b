//! `navpilot onboard` — write a starter configuration.

use navpilot_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let dir = AppConfig::config_dir();
    let path = dir.join("config.toml");

    println!("🧭 NavPilot setup\n");

    if path.exists() {
        println!("Nothing to do, {} already exists.", path.display());
        println!("Remove it first to regenerate the defaults.");
        return Ok(());
    }

    std::fs::create_dir_all(&dir)?;
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("✅ Wrote {}", path.display());

    println!("\nBefore the first run:");
    println!("  • put an API key in the file, or export NAVPILOT_API_KEY");
    println!("  • for web goals, start a WebDriver: chromedriver --port=9515");
    println!("  • then try: navpilot run \"What is the price of a Surface Laptop?\"");

    Ok(())
}
