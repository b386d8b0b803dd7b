//! System prompts and request payloads for each oracle operation.
//!
//! Every request is a system message with the instructions below and a
//! user message holding a JSON payload. Field names in the payloads and in
//! the expected responses are camelCase.

use navpilot_core::{Action, Goal, SurfaceKind, SurfaceSnapshot};
use serde_json::{Value, json};

pub const CLASSIFY_START_LOCATION: &str = r#"You choose where an automation agent should begin working on a user's goal.

Input: a JSON object with "endGoal".

Pick the single best starting point. For web goals this is an absolute URL (a search engine, a shopping site, a known service). For desktop goals this is the identifier of the application to open.

Respond with a JSON object:
{ "startPage": "<url or application id>", "rationale": "<one short sentence>" }"#;

pub const PREDICT_NEXT_ACTION: &str = r#"You guide an automation agent one step at a time toward the user's end goal.

Input: a JSON object with
- "endGoal": what the user wants,
- "page": the current state (location, title, visible text, interactive elements, available action types),
- "previousActions": every action already taken, in order, with its outcome and failure reason if it failed.

Predict the single next action. Choose "actionType" from the page's "availableActions" (click, type, scroll, submit, navigate, wait). Do not repeat an action that failed unless the page has changed since.

Respond with a JSON object:
{
  "actionType": "click",
  "actionTarget": "<the element or region acted on>",
  "actionDescription": "<what the action does and why it helps>",
  "actionInput": "<text to type, scroll direction or URL; omit when not needed>"
}"#;

pub const GENERATE_WEB_CODE: &str = r#"You write JavaScript that performs one action on a live web page.

Input: a JSON object with "endGoal", "page" (location, title, visible text, interactive elements with CSS selectors), "nextAction" and, when a previous snippet failed, "previousAttempt" with its code and the error it raised.

Each snippet is the body of a function executed in the page. Locate elements with document.querySelector using the selectors provided. Throw an Error when the element cannot be found so the failure is reported. For typing, set the value and dispatch "input" and "change" events. For submit, submit the enclosing form or dispatch an Enter key press.

Write up to three alternative snippets, each using a different way to locate the target.

Respond with a JSON object:
{ "codeSet": ["<snippet>", "<snippet>"] }"#;

pub const GENERATE_DESKTOP_CODE: &str = r#"You write scripts that perform one action on a desktop application window.

Input: a JSON object with "endGoal", "page" (window title, visible text, UI elements with their paths), "nextAction" and, when a previous script failed, "previousAttempt" with its code and the error it produced.

Each script runs non-interactively in the configured shell. Address UI elements by the paths provided. Exit with a non-zero status when the target cannot be found.

Write up to three alternative scripts, each using a different way to locate the target.

Respond with a JSON object:
{ "codeSet": ["<script>", "<script>"] }"#;

pub const RANK_CODE_CANDIDATES: &str = r#"You sort automation code snippets by how likely they are to perform the next action successfully.

Input: a JSON object with "endGoal", "currentPageUrl", "nextAction" (actionType, actionTarget, actionDescription) and "codeSet".

Return every snippet from "codeSet" exactly once, unchanged, most relevant first.

Respond with a JSON object:
{ "codeSetByRelevance": ["<snippet>", "<snippet>"] }"#;

pub const EVALUATE_ACTION_FEEDBACK: &str = r#"You judge whether an action had its intended effect.

Input: a JSON object with "beforePage", "afterPage", "takenAction" and "observedChanges" (a locally computed summary of differences).

Decide whether the page changed in the way the action intended. Describe the changes and note any new information that appeared which is relevant to the action.

Respond with a JSON object:
{ "actionSuccess": true, "pageStateChanges": "<what changed>", "newInformation": "<new relevant information, or empty>" }"#;

pub const EVALUATE_GOAL_COMPLETION: &str = r#"You decide whether the user's end goal has been reached.

Input: a JSON object with "endGoal", "page" (the current state) and "newInformation" (what the last action revealed).

If the goal is met, extract the data that answers it as label/value pairs.

Respond with a JSON object:
{ "endGoalMet": true, "relevantData": [["<label>", "<value>"]] }"#;

/// Which code dialect to request for a surface.
pub fn code_prompt(surface: SurfaceKind) -> &'static str {
    match surface {
        SurfaceKind::Web => GENERATE_WEB_CODE,
        SurfaceKind::Desktop => GENERATE_DESKTOP_CODE,
    }
}

pub fn dialect(surface: SurfaceKind) -> &'static str {
    match surface {
        SurfaceKind::Web => "javascript",
        SurfaceKind::Desktop => "shell",
    }
}

/// Render a snapshot for inclusion in a payload, truncating text and elements.
pub fn snapshot_payload(snapshot: &SurfaceSnapshot, max_chars: usize, max_elements: usize) -> Value {
    let content: String = snapshot.content.chars().take(max_chars).collect();
    let elements: Vec<Value> = snapshot
        .elements
        .iter()
        .take(max_elements)
        .map(|e| json!({ "selector": e.selector, "role": e.role, "label": e.label }))
        .collect();
    let actions: Vec<&str> = snapshot.available_actions.iter().map(|k| k.as_str()).collect();

    json!({
        "surface": snapshot.surface.to_string(),
        "location": snapshot.location,
        "title": snapshot.title,
        "content": content,
        "elements": elements,
        "availableActions": actions,
    })
}

/// Render an action the way the response schema names its fields.
pub fn action_payload(action: &Action) -> Value {
    let mut value = json!({
        "actionType": action.kind.as_str(),
        "actionTarget": action.target,
        "actionDescription": action.description,
    });
    if let Some(input) = &action.input {
        value["actionInput"] = json!(input);
    }
    value
}

/// An action plus its settled outcome, for the history sent with predictions.
pub fn history_payload(history: &[Action]) -> Value {
    let entries: Vec<Value> = history
        .iter()
        .map(|action| {
            let mut value = action_payload(action);
            value["outcome"] = json!(action.outcome());
            if let Some(reason) = action.failure_reason() {
                value["failureReason"] = json!(reason);
            }
            value
        })
        .collect();
    Value::Array(entries)
}

pub fn goal_payload(goal: &Goal) -> Value {
    json!({ "endGoal": goal.as_str() })
}
