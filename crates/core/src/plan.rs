//! Toolset plans — pre-declared multi-step runs.
//!
//! A plan names the tool (application, site) each step starts from, so the
//! start-location classification is skipped and each step's prompt becomes
//! that step's goal.

use serde::{Deserialize, Serialize};

/// One step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// The tool the step starts from (app identifier or URL)
    #[serde(alias = "toolId")]
    pub tool_id: String,

    /// The goal for this step
    #[serde(alias = "toolPrompt", alias = "taskPrompt")]
    pub task_prompt: String,
}

/// An ordered list of steps with a human-readable description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsetPlan {
    #[serde(default)]
    pub description: String,

    pub steps: Vec<PlanStep>,
}

impl ToolsetPlan {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, tool_id: impl Into<String>, task_prompt: impl Into<String>) -> Self {
        self.steps.push(PlanStep {
            tool_id: tool_id.into(),
            task_prompt: task_prompt.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keeps_step_order() {
        let plan = ToolsetPlan::new("Movie night")
            .step("Microsoft.ZuneVideo", "Find 'The Matrix'")
            .step("Edge", "Open deliveroo.ie and order some pizza.");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].tool_id, "Microsoft.ZuneVideo");
        assert_eq!(plan.steps[1].tool_id, "Edge");
    }

    #[test]
    fn plan_parses_from_json() {
        let plan: ToolsetPlan = serde_json::from_str(
            r#"{"description":"Resume","steps":[{"tool_id":"Word","task_prompt":"Create a resume"}]}"#,
        )
        .unwrap();
        assert_eq!(plan.steps[0].task_prompt, "Create a resume");
    }

    #[test]
    fn camel_case_step_names_are_accepted() {
        let plan: ToolsetPlan = serde_json::from_str(
            r#"{"description":"Movies","steps":[
                {"toolId":"Microsoft.ZuneVideo_8wekyb3d8bbwe","toolPrompt":"Find 'The Matrix'"},
                {"toolId":"Edge","taskPrompt":"Open deliveroo.ie and order some pizza."}
            ]}"#,
        )
        .unwrap();
        assert_eq!(plan.steps[0].tool_id, "Microsoft.ZuneVideo_8wekyb3d8bbwe");
        assert_eq!(plan.steps[0].task_prompt, "Find 'The Matrix'");
        assert_eq!(plan.steps[1].task_prompt, "Open deliveroo.ie and order some pizza.");
    }
}
