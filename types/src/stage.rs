//! The reasoning pipeline stages.

use serde::{Deserialize, Serialize};

/// One of the six named checkpoints in an assistant's per-thought reasoning
/// pipeline, in pipeline order.
///
/// Stage names arrive on the wire as the SSE `event:` field. Unknown names are
/// not representable here; callers skip records whose stage does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// A new thought has opened within a task.
    ThoughtStart,
    /// The assistant is laying out its approach for this thought.
    Planning,
    /// Incremental progress on the current step.
    StepUpdate,
    /// An action (tool invocation, response draft) has been chosen.
    ActionSelected,
    /// The outcome of the selected action. Terminal-action detection looks
    /// only at this stage.
    ActionResult,
    /// The thought's closing summary.
    Conclusion,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 6] = [
        Stage::ThoughtStart,
        Stage::Planning,
        Stage::StepUpdate,
        Stage::ActionSelected,
        Stage::ActionResult,
        Stage::Conclusion,
    ];

    /// Parse a wire-format stage name. Returns `None` for unknown names.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "thought_start" => Some(Self::ThoughtStart),
            "planning" => Some(Self::Planning),
            "step_update" => Some(Self::StepUpdate),
            "action_selected" => Some(Self::ActionSelected),
            "action_result" => Some(Self::ActionResult),
            "conclusion" => Some(Self::Conclusion),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ThoughtStart => "thought_start",
            Self::Planning => "planning",
            Self::StepUpdate => "step_update",
            Self::ActionSelected => "action_selected",
            Self::ActionResult => "action_result",
            Self::Conclusion => "conclusion",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
