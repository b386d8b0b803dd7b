//! Wiring shared by `run` and `plan`: configuration in, a ready agent out.

use navpilot_agent::{AgentLoop, BacktrackPolicy};
use navpilot_config::AppConfig;
use navpilot_core::{ActionOutcome, DomainEvent, EventBus, ProviderError, Surface};
use navpilot_oracle::{LlmOracle, OracleSettings};
use navpilot_surfaces::{QuoteStyle, ScriptSettings, ScriptSurface, WebDriverSettings, WebDriverSurface};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The live surface, kept typed so a browser session can be closed.
pub enum SurfaceHandle {
    Web(Arc<WebDriverSurface>),
    Desktop(Arc<ScriptSurface>),
}

impl SurfaceHandle {
    pub fn as_surface(&self) -> Arc<dyn Surface> {
        match self {
            Self::Web(web) => web.clone(),
            Self::Desktop(desktop) => desktop.clone(),
        }
    }

    pub async fn shutdown(self) {
        if let Self::Web(web) = self {
            match Arc::try_unwrap(web) {
                Ok(web) => {
                    if let Err(e) = web.close().await {
                        warn!(error = %e, "Failed to close browser session");
                    }
                }
                Err(_) => warn!("Browser session still in use, leaving it open"),
            }
        }
    }
}

/// An agent bound to a surface, with a task printing its progress.
pub struct Session {
    pub agent: AgentLoop,
    surface: SurfaceHandle,
    printer: JoinHandle<()>,
}

impl Session {
    /// Build the oracle, open the surface and configure the agent.
    pub async fn start(
        config: &AppConfig,
        surface_kind: Option<String>,
        max_iterations: Option<u32>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        // Check for API key early — give a clear error
        if !config.has_api_key() && config.default_provider != "ollama" {
            eprintln!();
            eprintln!("  ERROR: No API key configured!");
            eprintln!();
            eprintln!("  Set one of these environment variables:");
            eprintln!("    NAVPILOT_API_KEY     (generic)");
            eprintln!("    OPENAI_API_KEY       (for OpenAI direct)");
            eprintln!("    OPENROUTER_API_KEY   (for OpenRouter)");
            eprintln!();
            eprintln!("  Or add it to your config file:");
            eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
            eprintln!();
            return Err("No API key found. See above for setup instructions.".into());
        }

        let kind = surface_kind.unwrap_or_else(|| config.surface.kind.clone());
        let backtrack: BacktrackPolicy = config.agent.backtrack.parse()?;

        let event_bus = Arc::new(EventBus::default());
        let printer = tokio::spawn(print_progress(event_bus.subscribe()));

        let router = navpilot_providers::build_from_config(config);
        let (provider, model) = router
            .resolve(config.model())
            .ok_or_else(|| ProviderError::NotConfigured(config.default_provider.clone()))?;
        info!(provider = %provider.name(), model = %model, "Using provider");

        let oracle = LlmOracle::new(provider, model)
            .with_temperature(config.default_temperature)
            .with_seed(config.seed)
            .with_max_tokens(config.default_max_tokens)
            .with_settings(oracle_settings(config))
            .with_event_bus(event_bus.clone());

        let surface = open_surface(config, &kind).await?;

        let mut agent = AgentLoop::new(Arc::new(oracle), surface.as_surface(), event_bus)
            .with_max_code_retries(config.agent.max_code_retries)
            .with_backtrack(backtrack);
        if let Some(max) = max_iterations.or(config.agent.max_iterations) {
            agent = agent.with_max_iterations(max);
        }
        if let Some(secs) = config.agent.timeout_secs {
            agent = agent.with_timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            agent,
            surface,
            printer,
        })
    }

    /// Drop the agent, drain the progress printer and release the surface.
    pub async fn finish(self) {
        let Self {
            agent,
            surface,
            printer,
        } = self;
        // Dropping the agent drops the last event sender
        drop(agent);
        let _ = printer.await;
        surface.shutdown().await;
    }
}

async fn open_surface(
    config: &AppConfig,
    kind: &str,
) -> Result<SurfaceHandle, Box<dyn std::error::Error>> {
    match kind {
        "web" => {
            let surface = WebDriverSurface::connect(web_settings(config)).await?;
            Ok(SurfaceHandle::Web(Arc::new(surface)))
        }
        "desktop" => Ok(SurfaceHandle::Desktop(Arc::new(ScriptSurface::new(
            script_settings(config)?,
        )))),
        other => Err(format!("unknown surface '{other}' (expected web or desktop)").into()),
    }
}

pub fn oracle_settings(config: &AppConfig) -> OracleSettings {
    OracleSettings {
        max_snapshot_chars: config.oracle.max_snapshot_chars,
        max_elements: config.oracle.max_elements,
        rank_candidates: config.oracle.rank_candidates,
    }
}

pub fn web_settings(config: &AppConfig) -> WebDriverSettings {
    let web = &config.surface.web;
    WebDriverSettings {
        webdriver_url: web.webdriver_url.clone(),
        headless: web.headless,
        navigation_wait: Duration::from_millis(web.navigation_wait_ms),
        settle: Duration::from_millis(web.settle_ms),
        max_content_chars: web.max_content_chars,
        max_elements: web.max_elements,
        ..WebDriverSettings::default()
    }
}

pub fn script_settings(config: &AppConfig) -> Result<ScriptSettings, String> {
    let desktop = &config.surface.desktop;
    Ok(ScriptSettings {
        shell: desktop.shell.clone(),
        launch_command: desktop.launch_command.clone(),
        snapshot_command: desktop.snapshot_command.clone(),
        inventory_command: desktop.inventory_command.clone(),
        quote_style: desktop.quote_style.parse::<QuoteStyle>()?,
        timeout: Duration::from_secs(desktop.script_timeout_secs),
    })
}

async fn print_progress(mut rx: broadcast::Receiver<Arc<DomainEvent>>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(line) = describe(&event) {
                    eprintln!("  {line}");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Progress output fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// One progress line per event worth showing.
pub fn describe(event: &DomainEvent) -> Option<String> {
    match event {
        DomainEvent::RunStarted { goal, location, .. } => {
            Some(format!("▶ {goal} (starting at {location})"))
        }
        DomainEvent::ActionPredicted {
            iteration,
            kind,
            description,
            ..
        } => Some(format!("[{iteration}] {kind}: {description}")),
        DomainEvent::CodeExecuted {
            success: false,
            attempts,
            ..
        } => Some(format!("    code failed after {attempts} attempt(s)")),
        DomainEvent::FeedbackEvaluated {
            outcome: ActionOutcome::Failure,
            changes,
            ..
        } if !changes.is_empty() => Some(format!("    rejected: {changes}")),
        DomainEvent::FeedbackEvaluated {
            outcome: ActionOutcome::Failure,
            ..
        } => Some("    rejected".into()),
        DomainEvent::FeedbackEvaluated { changes, .. } => Some(format!("    ok: {changes}")),
        DomainEvent::RunFinished {
            success, iterations, ..
        } => Some(if *success {
            format!("✔ goal met after {iterations} iteration(s)")
        } else {
            format!("✘ gave up after {iterations} iteration(s)")
        }),
        DomainEvent::ErrorOccurred { error_message, .. } => Some(format!("    error: {error_message}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use navpilot_core::ActionKind;

    #[test]
    fn config_maps_to_surface_settings() {
        let mut config = AppConfig::default();
        config.surface.web.settle_ms = 250;
        config.surface.desktop.quote_style = "none".into();
        config.surface.desktop.inventory_command = Some("list-tools".into());

        let web = web_settings(&config);
        assert_eq!(web.settle, Duration::from_millis(250));
        assert_eq!(web.webdriver_url, "http://localhost:9515");

        let script = script_settings(&config).unwrap();
        assert_eq!(script.quote_style, QuoteStyle::None);
        assert_eq!(script.timeout, Duration::from_secs(30));
        assert_eq!(script.inventory_command.as_deref(), Some("list-tools"));

        let defaults = script_settings(&AppConfig::default()).unwrap();
        assert_eq!(defaults.quote_style, QuoteStyle::platform_default());
    }

    #[test]
    fn bad_quote_style_is_rejected() {
        let mut config = AppConfig::default();
        config.surface.desktop.quote_style = "backtick".into();
        assert!(script_settings(&config).is_err());
    }

    #[test]
    fn progress_lines() {
        let predicted = DomainEvent::ActionPredicted {
            iteration: 3,
            kind: ActionKind::Click,
            description: "Open the first result".into(),
            timestamp: Utc::now(),
        };
        assert_eq!(
            describe(&predicted).unwrap(),
            "[3] click: Open the first result"
        );

        let rejected = DomainEvent::FeedbackEvaluated {
            iteration: 3,
            outcome: ActionOutcome::Failure,
            changes: String::new(),
            timestamp: Utc::now(),
        };
        assert_eq!(describe(&rejected).unwrap(), "    rejected");

        let executed = DomainEvent::CodeExecuted {
            iteration: 3,
            success: true,
            attempts: 1,
            timestamp: Utc::now(),
        };
        assert!(describe(&executed).is_none());
    }
}
