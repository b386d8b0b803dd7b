//! Response extraction and shape validation.
//!
//! Every completion is reduced to a JSON object, decoded into a wire struct,
//! and validated. Anything that fails becomes [`OracleReply::Malformed`];
//! callers never see a raw parse error.

use navpilot_core::oracle::kind_available;
use navpilot_core::{
    Action, ActionKind, DataPair, FeedbackResult, GoalCheckResult, OracleReply, StartLocation,
    SurfaceSnapshot,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Pull a JSON object out of a completion: bare, fenced, or embedded in prose.
///
/// Only the first balanced object is kept, so prose after it is ignored.
pub fn extract_json_object(raw: &str) -> Option<String> {
    let trimmed = raw.trim_start();
    let body = if trimmed.starts_with('{') {
        trimmed
    } else {
        fenced_block(raw).unwrap_or(raw)
    };
    balanced_object(body).map(str::to_string)
}

/// Contents of the first fenced block that holds a `{`.
fn fenced_block(raw: &str) -> Option<&str> {
    let fence = "```";
    let start = raw.find(fence)?;
    let after_fence = &raw[start + fence.len()..];
    let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
    let end = after_lang.find(fence)?;
    let block = &after_lang[..end];
    block.contains('{').then_some(block)
}

/// The first `{...}` span with balanced braces. Braces inside string
/// literals do not count.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + idx]);
                }
            }
            _ => {}
        }
    }
    None
}

fn decode<W: DeserializeOwned>(raw: &str) -> Result<W, String> {
    let json = extract_json_object(raw).ok_or_else(|| "no JSON object in response".to_string())?;
    serde_json::from_str(&json).map_err(|e| e.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// --- Wire shapes ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartLocationWire {
    #[serde(alias = "toolId", alias = "startUrl")]
    start_page: Option<String>,
    #[serde(default)]
    rationale: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionWire {
    action_type: String,
    #[serde(default)]
    action_target: Option<String>,
    #[serde(default)]
    action_description: Option<String>,
    #[serde(default)]
    action_input: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CodeSetWire {
    code_set: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CodeRankWire {
    code_set_by_relevance: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackWire {
    action_success: bool,
    #[serde(default)]
    page_state_changes: Option<String>,
    #[serde(default)]
    new_information: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoalWire {
    end_goal_met: bool,
    #[serde(default)]
    relevant_data: Vec<Value>,
}

// --- Per-operation validation ---

pub fn start_location(raw: &str) -> OracleReply<StartLocation> {
    let wire: StartLocationWire = match decode(raw) {
        Ok(w) => w,
        Err(reason) => return OracleReply::malformed(reason, raw),
    };
    match non_blank(wire.start_page) {
        Some(target) => OracleReply::Valid(StartLocation {
            target,
            rationale: non_blank(wire.rationale),
        }),
        None => OracleReply::malformed("missing startPage", raw),
    }
}

/// Validate a predicted action against the kinds the snapshot's surface supports.
pub fn next_action(raw: &str, snapshot: &SurfaceSnapshot) -> OracleReply<Action> {
    let wire: ActionWire = match decode(raw) {
        Ok(w) => w,
        Err(reason) => return OracleReply::malformed(reason, raw),
    };

    let kind: ActionKind = match wire.action_type.parse() {
        Ok(kind) => kind,
        Err(reason) => return OracleReply::malformed(reason, raw),
    };
    if !kind_available(snapshot, kind) {
        return OracleReply::malformed(
            format!("action kind '{kind}' is not available on this {} surface", snapshot.surface),
            raw,
        );
    }

    let target = non_blank(wire.action_target).unwrap_or_default();
    let Some(description) = non_blank(wire.action_description) else {
        return OracleReply::malformed("missing actionDescription", raw);
    };

    let mut action = Action::new(kind, target, description);
    if let Some(input) = wire.action_input.as_ref().and_then(scalar_text) {
        action = action.with_input(input);
    }
    OracleReply::Valid(action)
}

/// Candidate snippets with blanks and duplicates removed, order kept.
pub fn code_set(raw: &str) -> OracleReply<Vec<String>> {
    let wire: CodeSetWire = match decode(raw) {
        Ok(w) => w,
        Err(reason) => return OracleReply::malformed(reason, raw),
    };
    let mut seen = std::collections::HashSet::new();
    let candidates: Vec<String> = wire
        .code_set
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && seen.insert(c.clone()))
        .collect();
    if candidates.is_empty() {
        return OracleReply::malformed("codeSet is empty", raw);
    }
    OracleReply::Valid(candidates)
}

/// A ranking is only accepted when it is a permutation of `original`.
pub fn ranking(raw: &str, original: &[String]) -> OracleReply<Vec<String>> {
    let wire: CodeRankWire = match decode(raw) {
        Ok(w) => w,
        Err(reason) => return OracleReply::malformed(reason, raw),
    };
    let ranked: Vec<String> = wire
        .code_set_by_relevance
        .into_iter()
        .map(|c| c.trim().to_string())
        .collect();

    let mut expected: Vec<&String> = original.iter().collect();
    let mut actual: Vec<&String> = ranked.iter().collect();
    expected.sort();
    actual.sort();
    if expected != actual {
        return OracleReply::malformed("codeSetByRelevance is not a permutation of codeSet", raw);
    }
    OracleReply::Valid(ranked)
}

pub fn feedback(raw: &str) -> OracleReply<FeedbackResult> {
    match decode::<FeedbackWire>(raw) {
        Ok(wire) => OracleReply::Valid(FeedbackResult {
            action_success: wire.action_success,
            page_state_changes: wire.page_state_changes.unwrap_or_default(),
            new_information: wire.new_information.unwrap_or_default(),
        }),
        Err(reason) => OracleReply::malformed(reason, raw),
    }
}

/// Relevant data may arrive as `[label, value]` arrays or `{label, value}`
/// objects. Pairs are kept as-is; incomplete ones are filtered by the caller.
pub fn goal_check(raw: &str) -> OracleReply<GoalCheckResult> {
    match decode::<GoalWire>(raw) {
        Ok(wire) => OracleReply::Valid(GoalCheckResult {
            end_goal_met: wire.end_goal_met,
            relevant_data: wire.relevant_data.iter().map(data_pair).collect(),
        }),
        Err(reason) => OracleReply::malformed(reason, raw),
    }
}

fn data_pair(value: &Value) -> DataPair {
    match value {
        Value::Array(items) => DataPair {
            label: items.first().and_then(scalar_text),
            value: items.get(1).and_then(scalar_text),
        },
        Value::Object(map) => DataPair {
            label: map.get("label").or_else(|| map.get("name")).and_then(scalar_text),
            value: map.get("value").and_then(scalar_text),
        },
        _ => DataPair::default(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
