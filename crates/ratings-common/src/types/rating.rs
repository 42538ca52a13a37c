use serde::{Deserialize, Serialize};

/// Normalised score for a rating label, from 0.0 (strong sell) to 1.0 (strong buy).
///
/// Labels are compared case-insensitively; unknown labels have no score.
pub fn rating_score(label: &str) -> Option<f64> {
    match label.trim().to_lowercase().as_str() {
        "strong buy" | "strong-buy" => Some(1.0),
        "buy" => Some(0.8),
        "outperform" => Some(0.75),
        "hold" => Some(0.5),
        "neutral" => Some(0.4),
        "underperform" => Some(0.25),
        "sell" => Some(0.2),
        "strong sell" | "strong-sell" => Some(0.0),
        _ => None,
    }
}

/// Kind of analyst action, derived from the provider's free-form action text.
///
/// The provider phrases actions as "<verb> by" (e.g. "upgraded by",
/// "target raised by"). Anything outside the known phrases is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Upgrade,
    Downgrade,
    TargetRaised,
    TargetLowered,
    TargetSet,
    Initiated,
    Reiterated,
    Other,
}

impl ActionCategory {
    const PREFIXES: [(&'static str, ActionCategory); 7] = [
        ("upgraded", ActionCategory::Upgrade),
        ("downgraded", ActionCategory::Downgrade),
        ("target raised", ActionCategory::TargetRaised),
        ("target lowered", ActionCategory::TargetLowered),
        ("target set", ActionCategory::TargetSet),
        ("initiated", ActionCategory::Initiated),
        ("reiterated", ActionCategory::Reiterated),
    ];

    pub fn classify(action: &str) -> Self {
        let action = action.trim().to_lowercase();
        Self::PREFIXES
            .iter()
            .find(|(prefix, _)| action.starts_with(prefix))
            .map(|(_, category)| *category)
            .unwrap_or(ActionCategory::Other)
    }

    /// Whether the action on its own signals a favourable view.
    ///
    /// Only rating actions count; a target revision alone is not a
    /// recommendation.
    pub fn is_positive(self) -> bool {
        matches!(
            self,
            ActionCategory::Upgrade | ActionCategory::Initiated | ActionCategory::Reiterated
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionCategory::Upgrade => "upgrade",
            ActionCategory::Downgrade => "downgrade",
            ActionCategory::TargetRaised => "target_raised",
            ActionCategory::TargetLowered => "target_lowered",
            ActionCategory::TargetSet => "target_set",
            ActionCategory::Initiated => "initiated",
            ActionCategory::Reiterated => "reiterated",
            ActionCategory::Other => "other",
        }
    }
}

impl std::fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
