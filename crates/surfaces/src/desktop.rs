//! Desktop window trees driven through a scripting shell.
//!
//! Synthesized code is a script run by the configured interpreter
//! (`sh -c`, `powershell -NonInteractive -Command`, ...). Launching a tool
//! and capturing a snapshot are themselves scripts: the launch command is a
//! template with `{target}` and `{path}` substituted, and the snapshot
//! command prints a JSON document describing the focused window.
//!
//! An optional inventory command lists the installed tools as JSON. When
//! one is configured, `open` only launches tools it lists and substitutes
//! their launch path for `{path}`.

use async_trait::async_trait;
use navpilot_core::{
    ActionKind, ElementInfo, ExecutionOutcome, StartLocation, Surface, SurfaceError, SurfaceKind,
    SurfaceSnapshot,
};
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

const DESKTOP_ACTIONS: [ActionKind; 5] = [
    ActionKind::Click,
    ActionKind::Type,
    ActionKind::Scroll,
    ActionKind::Submit,
    ActionKind::Wait,
];

/// How substituted values are quoted in the launch command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    /// POSIX shells: single quotes, embedded `'` written as `'\''`
    Posix,
    /// PowerShell: single quotes, embedded `'` doubled
    Single,
    /// Substituted verbatim
    None,
}

impl QuoteStyle {
    /// The style matching the platform's default shell.
    pub fn platform_default() -> Self {
        if cfg!(target_os = "windows") {
            Self::Single
        } else {
            Self::Posix
        }
    }
}

impl std::str::FromStr for QuoteStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posix" => Ok(Self::Posix),
            "single" => Ok(Self::Single),
            "none" => Ok(Self::None),
            other => Err(format!("unknown quote style '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptSettings {
    /// Interpreter and leading arguments; the script is appended last
    pub shell: Vec<String>,
    pub launch_command: String,
    pub snapshot_command: String,

    /// Prints a JSON array of installed tools
    pub inventory_command: Option<String>,
    pub quote_style: QuoteStyle,
    pub timeout: Duration,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            shell: vec!["sh".into(), "-c".into()],
            launch_command: "{target}".into(),
            snapshot_command: "echo '{}'".into(),
            inventory_command: None,
            quote_style: QuoteStyle::platform_default(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// A desktop application exposed as a [`Surface`].
pub struct ScriptSurface {
    settings: ScriptSettings,
}

impl ScriptSurface {
    pub fn new(settings: ScriptSettings) -> Self {
        Self { settings }
    }

    /// The launch command with `{target}` and `{path}` substituted.
    pub fn launch_script(&self, target: &str, path: &str) -> String {
        let style = self.settings.quote_style;
        self.settings
            .launch_command
            .replace("{target}", &quote_arg(target, style))
            .replace("{path}", &quote_arg(path, style))
    }

    /// Run the inventory command, if one is configured.
    pub async fn installed_tools(&self) -> Result<Option<Vec<InstalledTool>>, SurfaceError> {
        let Some(command) = &self.settings.inventory_command else {
            return Ok(None);
        };
        let outcome = self.run_script(command).await;
        if !outcome.success {
            return Err(SurfaceError::Unreachable(format!(
                "inventory command failed: {}",
                outcome.fault.unwrap_or_default()
            )));
        }
        parse_inventory(&outcome.output).map(Some)
    }

    /// The launch path for `target`: the inventory's path when it lists one,
    /// otherwise the target itself.
    async fn resolve_launch_path(&self, target: &str) -> Result<String, SurfaceError> {
        let Some(tools) = self.installed_tools().await? else {
            return Ok(target.to_string());
        };
        let tool = tools
            .iter()
            .find(|t| t.id.eq_ignore_ascii_case(target))
            .ok_or_else(|| SurfaceError::Launch {
                target: target.to_string(),
                reason: format!("not among the {} installed tools", tools.len()),
            })?;
        debug!(tool = %tool.id, path = ?tool.path, "Resolved installed tool");
        Ok(tool.path.clone().unwrap_or_else(|| target.to_string()))
    }

    async fn run_script(&self, script: &str) -> ExecutionOutcome {
        let Some((program, args)) = self.settings.shell.split_first() else {
            return ExecutionOutcome::fault("no shell configured");
        };

        debug!(program = %program, "Running script");

        let mut command = Command::new(program);
        command.args(args).arg(script).kill_on_drop(true);

        match tokio::time::timeout(self.settings.timeout, command.output()).await {
            Err(_) => ExecutionOutcome::fault(format!(
                "script timed out after {}ms",
                self.settings.timeout.as_millis()
            )),
            Ok(Err(e)) => ExecutionOutcome::fault(format!("failed to start {program}: {e}")),
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

                if output.status.success() {
                    ExecutionOutcome::ok(stdout)
                } else {
                    let code = output.status.code().unwrap_or(-1);
                    warn!(exit_code = code, "Script failed");
                    let detail = if stderr.is_empty() { stdout } else { stderr };
                    ExecutionOutcome::fault(format!("[exit code: {code}] {detail}"))
                }
            }
        }
    }
}

#[async_trait]
impl Surface for ScriptSurface {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Desktop
    }

    fn action_kinds(&self) -> &[ActionKind] {
        &DESKTOP_ACTIONS
    }

    async fn open(&self, location: &StartLocation) -> Result<(), SurfaceError> {
        let path = self.resolve_launch_path(&location.target).await?;
        let outcome = self
            .run_script(&self.launch_script(&location.target, &path))
            .await;
        if outcome.success {
            Ok(())
        } else {
            Err(SurfaceError::Launch {
                target: location.target.clone(),
                reason: outcome.fault.unwrap_or_default(),
            })
        }
    }

    async fn snapshot(&self) -> Result<SurfaceSnapshot, SurfaceError> {
        let outcome = self.run_script(&self.settings.snapshot_command).await;
        if !outcome.success {
            return Err(SurfaceError::Snapshot(outcome.fault.unwrap_or_default()));
        }
        parse_snapshot(&outcome.output)
    }

    async fn execute(&self, code: &str) -> ExecutionOutcome {
        self.run_script(code).await
    }
}

/// Quote a value for substitution into a command template.
pub fn quote_arg(value: &str, style: QuoteStyle) -> String {
    match style {
        QuoteStyle::Posix => format!("'{}'", value.replace('\'', r"'\''")),
        QuoteStyle::Single => format!("'{}'", value.replace('\'', "''")),
        QuoteStyle::None => value.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct WindowWire {
    #[serde(alias = "window", alias = "handle")]
    location: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    elements: Vec<ElementInfo>,
}

/// One entry of the installed-tool inventory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstalledTool {
    #[serde(alias = "Title", alias = "title", alias = "name")]
    pub id: String,

    #[serde(default, alias = "Path", alias = "launchPath")]
    pub path: Option<String>,
}

/// Parse the JSON array printed by the inventory command.
pub fn parse_inventory(stdout: &str) -> Result<Vec<InstalledTool>, SurfaceError> {
    serde_json::from_str(stdout.trim()).map_err(|e| {
        SurfaceError::Unreachable(format!("inventory output is not a tool list: {e}"))
    })
}

/// Parse the JSON printed by the snapshot command.
pub fn parse_snapshot(stdout: &str) -> Result<SurfaceSnapshot, SurfaceError> {
    let window: WindowWire = serde_json::from_str(stdout.trim())
        .map_err(|e| SurfaceError::Snapshot(format!("snapshot command output is not a window document: {e}")))?;

    let mut snapshot = SurfaceSnapshot::new(SurfaceKind::Desktop, window.location);
    snapshot.title = window.title;
    snapshot.content = window.content;
    snapshot.elements = window.elements;
    snapshot.available_actions = DESKTOP_ACTIONS.to_vec();
    Ok(snapshot)
}
