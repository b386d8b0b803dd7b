//! Web pages driven through a WebDriver endpoint.
//!
//! Synthesized code is JavaScript run as the body of an async function in
//! the page. Snapshots come from an in-page script that collects the URL,
//! title, visible text and an inventory of interactive elements.

use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder};
use navpilot_core::{
    ActionKind, ElementInfo, ExecutionOutcome, StartLocation, Surface, SurfaceError, SurfaceKind,
    SurfaceSnapshot,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

const WEB_ACTIONS: [ActionKind; 6] = ActionKind::ALL;

const SNAPSHOT_SCRIPT: &str = r#"
const maxChars = arguments[0];
const maxElements = arguments[1];

function selectorFor(el) {
    if (el.id) return '#' + CSS.escape(el.id);
    const name = el.getAttribute('name');
    if (name) return el.tagName.toLowerCase() + '[name="' + name.replace(/"/g, '\\"') + '"]';
    const parts = [];
    let node = el;
    while (node && node.nodeType === 1 && node !== document.body) {
        let index = 1;
        let sibling = node.previousElementSibling;
        while (sibling) {
            if (sibling.tagName === node.tagName) index++;
            sibling = sibling.previousElementSibling;
        }
        parts.unshift(node.tagName.toLowerCase() + ':nth-of-type(' + index + ')');
        node = node.parentElement;
    }
    return 'body > ' + parts.join(' > ');
}

function visible(el) {
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none';
}

const candidates = document.querySelectorAll(
    'a[href], button, input, select, textarea, [role="button"], [role="link"], [role="tab"], [contenteditable="true"]'
);
const elements = [];
for (const el of candidates) {
    if (elements.length >= maxElements) break;
    if (!visible(el)) continue;
    const label = (el.innerText || el.value || el.getAttribute('aria-label') || el.getAttribute('placeholder') || el.getAttribute('title') || '').trim();
    elements.push({
        selector: selectorFor(el),
        role: el.getAttribute('role') || el.tagName.toLowerCase(),
        label: label.slice(0, 120),
    });
}

const text = (document.body ? document.body.innerText : '').replace(/\s+\n/g, '\n').trim();
return {
    location: window.location.href,
    title: document.title,
    content: text.slice(0, maxChars),
    elements: elements,
};
"#;

/// Connection and timing settings for [`WebDriverSurface`].
#[derive(Debug, Clone)]
pub struct WebDriverSettings {
    pub webdriver_url: String,
    pub headless: bool,

    /// Wait after opening the start location
    pub navigation_wait: Duration,

    /// Wait after each executed snippet
    pub settle: Duration,

    pub max_content_chars: usize,
    pub max_elements: usize,
    pub connect_timeout: Duration,
}

impl Default for WebDriverSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".into(),
            headless: true,
            navigation_wait: Duration::from_millis(5000),
            settle: Duration::from_millis(1500),
            max_content_chars: 8000,
            max_elements: 80,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// A browser session exposed as a [`Surface`].
pub struct WebDriverSurface {
    client: Client,
    settings: WebDriverSettings,
}

impl WebDriverSurface {
    /// Open a new WebDriver session.
    pub async fn connect(settings: WebDriverSettings) -> Result<Self, SurfaceError> {
        let mut builder = ClientBuilder::native();
        let connect = builder
            .capabilities(capabilities(settings.headless))
            .connect(&settings.webdriver_url);

        let client = tokio::time::timeout(settings.connect_timeout, connect)
            .await
            .map_err(|_| SurfaceError::Timeout {
                timeout_ms: settings.connect_timeout.as_millis() as u64,
            })?
            .map_err(|e| {
                SurfaceError::Unreachable(format!("{}: {e}", settings.webdriver_url))
            })?;

        info!(url = %settings.webdriver_url, headless = settings.headless, "WebDriver session started");
        Ok(Self { client, settings })
    }

    /// End the browser session.
    pub async fn close(self) -> Result<(), SurfaceError> {
        self.client
            .close()
            .await
            .map_err(|e| SurfaceError::Unreachable(e.to_string()))
    }

    async fn goto(&self, url: &str) -> Result<(), SurfaceError> {
        self.client
            .goto(url)
            .await
            .map_err(|e| SurfaceError::Navigation {
                target: url.to_string(),
                reason: e.to_string(),
            })?;
        tokio::time::sleep(self.settings.navigation_wait).await;
        Ok(())
    }
}

#[async_trait]
impl Surface for WebDriverSurface {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Web
    }

    fn action_kinds(&self) -> &[ActionKind] {
        &WEB_ACTIONS
    }

    async fn open(&self, location: &StartLocation) -> Result<(), SurfaceError> {
        let url = normalize_url(&location.target);
        debug!(url = %url, "Opening start page");
        self.goto(&url).await
    }

    async fn snapshot(&self) -> Result<SurfaceSnapshot, SurfaceError> {
        let args = vec![
            Value::from(self.settings.max_content_chars as u64),
            Value::from(self.settings.max_elements as u64),
        ];
        let value = self
            .client
            .execute(SNAPSHOT_SCRIPT, args)
            .await
            .map_err(|e| SurfaceError::Snapshot(e.to_string()))?;
        snapshot_from_value(value)
    }

    async fn execute(&self, code: &str) -> ExecutionOutcome {
        let outcome = match self.client.execute(&wrap_script(code), Vec::new()).await {
            Ok(value) => outcome_from_value(value),
            Err(e) => ExecutionOutcome::fault(format!("webdriver: {e}")),
        };
        if !outcome.success {
            warn!(fault = ?outcome.fault, "Page script failed");
        }
        tokio::time::sleep(self.settings.settle).await;
        outcome
    }

    async fn restore(&self, snapshot: &SurfaceSnapshot) -> Result<bool, SurfaceError> {
        debug!(url = %snapshot.location, "Restoring page location");
        self.goto(&snapshot.location).await?;
        Ok(true)
    }
}

/// Chrome capabilities, headless when requested.
pub fn capabilities(headless: bool) -> Map<String, Value> {
    let mut args = vec![
        Value::String("--disable-gpu".into()),
        Value::String("--no-sandbox".into()),
        Value::String("--disable-dev-shm-usage".into()),
        Value::String("--window-size=1920,1080".into()),
    ];
    if headless {
        args.insert(0, Value::String("--headless=new".into()));
    }

    let mut chrome_options = Map::new();
    chrome_options.insert("args".into(), Value::Array(args));

    let mut caps = Map::new();
    caps.insert("browserName".into(), Value::String("chrome".into()));
    caps.insert("goog:chromeOptions".into(), Value::Object(chrome_options));
    caps
}

/// Bare hostnames get an https scheme.
fn normalize_url(target: &str) -> String {
    let target = target.trim();
    if target.contains("://") || target.starts_with("about:") {
        target.to_string()
    } else {
        format!("https://{target}")
    }
}

/// Wrap a snippet so thrown errors come back as data.
pub fn wrap_script(code: &str) -> String {
    format!(
        "return (async () => {{\n\
         try {{\n\
         const value = await (async () => {{\n{code}\n}})();\n\
         return {{ ok: true, output: value === undefined || value === null ? '' : String(value) }};\n\
         }} catch (e) {{\n\
         return {{ ok: false, error: String((e && e.message) || e) }};\n\
         }}\n\
         }})();"
    )
}

#[derive(Debug, Deserialize)]
struct ScriptResult {
    ok: bool,
    #[serde(default)]
    output: String,
    #[serde(default)]
    error: Option<String>,
}

fn outcome_from_value(value: Value) -> ExecutionOutcome {
    match serde_json::from_value::<ScriptResult>(value) {
        Ok(result) if result.ok => ExecutionOutcome::ok(result.output),
        Ok(result) => {
            ExecutionOutcome::fault(result.error.unwrap_or_else(|| "script failed".into()))
        }
        Err(e) => ExecutionOutcome::fault(format!("unexpected script result: {e}")),
    }
}

#[derive(Debug, Deserialize)]
struct PageWire {
    location: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    elements: Vec<ElementInfo>,
}

fn snapshot_from_value(value: Value) -> Result<SurfaceSnapshot, SurfaceError> {
    let page: PageWire = serde_json::from_value(value)
        .map_err(|e| SurfaceError::Snapshot(format!("unexpected snapshot shape: {e}")))?;

    let mut snapshot = SurfaceSnapshot::new(SurfaceKind::Web, page.location);
    snapshot.title = page.title;
    snapshot.content = page.content;
    snapshot.elements = page.elements;
    snapshot.available_actions = WEB_ACTIONS.to_vec();
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn headless_flag_controls_args() {
        let caps = capabilities(true);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert_eq!(args[0], "--headless=new");

        let caps = capabilities(false);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(!args.iter().any(|a| a == "--headless=new"));
        assert_eq!(caps["browserName"], "chrome");
    }

    #[test]
    fn bare_hosts_get_a_scheme() {
        assert_eq!(normalize_url("www.bing.com"), "https://www.bing.com");
        assert_eq!(normalize_url("http://localhost:3000"), "http://localhost:3000");
        assert_eq!(normalize_url("about:blank"), "about:blank");
    }

    #[test]
    fn wrapped_script_embeds_code_in_try_block() {
        let wrapped = wrap_script("document.querySelector('#go').click();");
        assert!(wrapped.starts_with("return (async () =>"));
        assert!(wrapped.contains("try {"));
        assert!(wrapped.contains("document.querySelector('#go').click();"));
        assert!(wrapped.contains("catch (e)"));
    }

    #[test]
    fn script_results_become_outcomes() {
        let ok = outcome_from_value(json!({"ok": true, "output": "clicked"}));
        assert!(ok.success);
        assert_eq!(ok.output, "clicked");

        let failed = outcome_from_value(json!({"ok": false, "error": "Cannot read properties of null"}));
        assert!(!failed.success);
        assert!(failed.fault.unwrap().contains("null"));

        let odd = outcome_from_value(Value::Null);
        assert!(!odd.success);
    }

    #[test]
    fn page_value_becomes_snapshot() {
        let value = json!({
            "location": "https://www.bing.com/shopping?q=laptop",
            "title": "laptop - Shopping",
            "content": "Surface Laptop $999",
            "elements": [
                {"selector": "#sb_form_q", "role": "input", "label": "Search"},
                {"selector": "body > div:nth-of-type(2) > a:nth-of-type(1)", "role": "a", "label": "Surface Laptop"}
            ]
        });
        let snap = snapshot_from_value(value).unwrap();
        assert_eq!(snap.surface, SurfaceKind::Web);
        assert_eq!(snap.title, "laptop - Shopping");
        assert_eq!(snap.elements.len(), 2);
        assert_eq!(snap.available_actions.len(), 6);
    }

    #[test]
    fn snapshot_without_location_is_an_error() {
        let err = snapshot_from_value(json!({"title": "x"})).unwrap_err();
        assert!(matches!(err, SurfaceError::Snapshot(_)));
    }
}
