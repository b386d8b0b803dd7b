//! `navpilot doctor` — Diagnose configuration and provider health.

use navpilot_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 NavPilot Doctor — System Diagnostics");
    println!("======================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file, using defaults — run `navpilot onboard`");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found. Fix the config and re-run.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  ✅ API key configured");
    } else {
        println!("  ⚠️  No API key configured — set NAVPILOT_API_KEY or add api_key to config.toml");
        issues += 1;
    }

    let router = navpilot_providers::build_from_config(&config);
    match router.resolve(config.model()) {
        Some((provider, model)) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider {} reachable (model {model})", provider.name()),
            Ok(false) => {
                println!("  ❌ Provider {} answered but reports unhealthy", provider.name());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider {} unreachable: {e}", provider.name());
                issues += 1;
            }
        },
        None => {
            println!("  ❌ No provider configured for {}", config.model());
            issues += 1;
        }
    }

    println!("  ✅ Surface: {}", config.surface.kind);
    if config.surface.kind == "web" {
        println!("     WebDriver endpoint: {}", config.surface.web.webdriver_url);
    } else {
        println!("     Shell: {}", config.surface.desktop.shell.join(" "));
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
