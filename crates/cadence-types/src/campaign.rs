//! Campaign definition types.
//!
//! A campaign file describes the stages of an outreach script: for each
//! stage, the message templates to send, the reply window per message, the
//! validator that gates acceptance, and whether the stage consumes the
//! previous stage's reply. Message text may contain `{user}` (replaced with
//! the endpoint's display name at build time) and `{date}` (replaced with
//! the previous stage's accepted reply when the stage depends on it).

use serde::{Deserialize, Serialize};

/// A complete campaign script, usually loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignDefinition {
    /// Human-readable campaign name, used in logs and the run summary.
    pub name: String,
    /// Stages in chain order. The first stage is the entry point.
    pub stages: Vec<StageTemplate>,
}

/// One stage of a campaign.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageTemplate {
    /// Stage name, used in logs and the run summary.
    pub name: String,
    /// Reply gate for this stage.
    #[serde(default)]
    pub validator: ValidatorKind,
    /// When true, the stage's start hook splices the previous stage's
    /// accepted reply into pending message text before dispatch.
    #[serde(default)]
    pub depends_on_previous: bool,
    /// Messages in dispatch order.
    pub steps: Vec<StepTemplate>,
}

/// One message template within a stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepTemplate {
    /// Message text, possibly containing `{user}` or `{date}` placeholders.
    pub text: String,
    /// Reply window in minutes, counted from dispatch.
    #[serde(default = "default_window_mins")]
    pub window_mins: u32,
}

fn default_window_mins() -> u32 {
    1
}

/// The reply gates a campaign stage can ask for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    /// Any non-blank reply is accepted.
    AcceptAny,
    /// Reply must be an RFC 5322-style email address.
    Email,
    /// Reply must be a calendar-valid `YYYY-MM-DD` date.
    Date,
    /// No reply is ever accepted; the stage runs out its queue.
    #[default]
    RejectAll,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_campaign_deserialize_from_toml() {
        let toml_str = r#"
name = "outreach"

[[stages]]
name = "collect-email"
validator = "email"

[[stages.steps]]
text = "Hi {user}! What's your email?"
window_mins = 2

[[stages.steps]]
text = "Still there, {user}?"

[[stages]]
name = "confirm"
validator = "accept_any"
depends_on_previous = true

[[stages.steps]]
text = "We have scheduled your interview on {date}"
window_mins = 3
"#;
        let campaign: CampaignDefinition = toml::from_str(toml_str).unwrap();
        assert_eq!(campaign.name, "outreach");
        assert_eq!(campaign.stages.len(), 2);

        let first = &campaign.stages[0];
        assert_eq!(first.validator, ValidatorKind::Email);
        assert!(!first.depends_on_previous);
        assert_eq!(first.steps[0].window_mins, 2);
        // window_mins falls back to the default when omitted
        assert_eq!(first.steps[1].window_mins, 1);

        let second = &campaign.stages[1];
        assert!(second.depends_on_previous);
        assert_eq!(second.validator, ValidatorKind::AcceptAny);
    }

    #[test]
    fn test_validator_kind_defaults_to_reject_all() {
        let toml_str = r#"
name = "silent"

[[stages]]
name = "no-gate"

[[stages.steps]]
text = "anyone home?"
"#;
        let campaign: CampaignDefinition = toml::from_str(toml_str).unwrap();
        assert_eq!(campaign.stages[0].validator, ValidatorKind::RejectAll);
    }

    #[test]
    fn test_validator_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&ValidatorKind::AcceptAny).unwrap(),
            "\"accept_any\""
        );
        let parsed: ValidatorKind = serde_json::from_str("\"date\"").unwrap();
        assert_eq!(parsed, ValidatorKind::Date);
    }

    #[test]
    fn test_campaign_serde_roundtrip() {
        let campaign = CampaignDefinition {
            name: "roundtrip".to_string(),
            stages: vec![StageTemplate {
                name: "only".to_string(),
                validator: ValidatorKind::Date,
                depends_on_previous: false,
                steps: vec![StepTemplate {
                    text: "When suits you?".to_string(),
                    window_mins: 5,
                }],
            }],
        };
        let json = serde_json::to_string(&campaign).unwrap();
        let parsed: CampaignDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, campaign);
    }
}
