//! Campaign loading and chain building.
//!
//! Turns a TOML campaign definition into a per-endpoint stage chain: renders
//! `{user}` placeholders from the endpoint's display name, installs the reply
//! gate each stage asks for, and wires dependent stages to splice the
//! previous stage's accepted reply into `{date}` placeholders at start time.

use std::path::Path;
use std::sync::LazyLock;

use cadence_core::chain::{Chain, ChainError};
use cadence_core::hooks::StageCallback;
use cadence_core::stage::{Stage, StepQueue};
use cadence_types::campaign::{CampaignDefinition, ValidatorKind};
use cadence_types::endpoint::EndpointId;
use cadence_types::reply::Reply;
use cadence_types::step::Step;
use regex::Regex;
use thiserror::Error;
use tracing::info;

/// Placeholder replaced with the endpoint's display name at build time.
const USER_PLACEHOLDER: &str = "{user}";

/// Placeholder replaced with the previous stage's accepted reply when a
/// dependent stage starts.
const PREVIOUS_REPLY_PLACEHOLDER: &str = "{date}";

/// RFC 5322-style address shape for the email gate.
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_!#$%&'*+/=?`{|}~^.-]+@[a-zA-Z0-9.-]+$")
        .expect("hardcoded email pattern is valid")
});

/// Calendar-valid `YYYY-MM-DD` shape for the date gate. February 29 is only
/// accepted in leap years, century rules included.
static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^((2000|2400|2800|(19|2[0-9])(0[48]|[2468][048]|[13579][26]))-02-29)$|^(((19|2[0-9])[0-9]{2})-02-(0[1-9]|1[0-9]|2[0-8]))$|^(((19|2[0-9])[0-9]{2})-(0[13578]|10|12)-(0[1-9]|[12][0-9]|3[01]))$|^(((19|2[0-9])[0-9]{2})-(0[469]|11)-(0[1-9]|[12][0-9]|30))$",
    )
    .expect("hardcoded date pattern is valid")
});

/// Errors loading a campaign definition from disk.
#[derive(Debug, Error)]
pub enum CampaignError {
    /// The campaign file could not be read.
    #[error("failed to read campaign file: {0}")]
    Io(#[from] std::io::Error),

    /// The campaign file is not valid TOML.
    #[error("failed to parse campaign file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The campaign defines no stages.
    #[error("campaign '{0}' has no stages")]
    NoStages(String),
}

/// Loads and checks a campaign definition from a TOML file.
pub fn load_campaign(path: &Path) -> Result<CampaignDefinition, CampaignError> {
    let raw = std::fs::read_to_string(path)?;
    let campaign: CampaignDefinition = toml::from_str(&raw)?;
    if campaign.stages.is_empty() {
        return Err(CampaignError::NoStages(campaign.name));
    }
    Ok(campaign)
}

/// Builds the chain for one endpoint from a campaign definition.
///
/// Each stage template becomes a stage bound to `endpoint`, linked to its
/// successor in file order. `{user}` is rendered into step text now;
/// `{date}` is left for the start hook of a dependent stage to splice once
/// the previous reply is known.
pub fn build_chain(
    campaign: &CampaignDefinition,
    endpoint: EndpointId,
    user: &str,
) -> Result<Chain, ChainError> {
    let mut chain = Chain::new();
    let mut previous: Option<usize> = None;

    for template in &campaign.stages {
        let mut stage = Stage::new(template.name.clone(), endpoint)
            .with_validator(validator_for(template.validator));

        let completed = completion_logger(campaign.name.clone(), template.name.clone());
        let callback = if template.depends_on_previous {
            stage = stage.depends_on_previous();
            StageCallback::with_start(splice_previous_reply, completed)
        } else {
            StageCallback::on_success(completed)
        };
        stage = stage.with_callback(callback);

        for step in &template.steps {
            stage.push_step(Step::new(step.window_mins, render_user(&step.text, user)));
        }

        let index = chain.push(stage);
        if let Some(from) = previous {
            chain.link(from, index)?;
        }
        previous = Some(index);
    }

    Ok(chain)
}

// ---------------------------------------------------------------------------
// Gates and hooks
// ---------------------------------------------------------------------------

/// Builds the reply gate a stage template asks for.
///
/// `RejectAll` turns into a gate that refuses everything, so the stage can
/// only advance by running out its windows.
fn validator_for(kind: ValidatorKind) -> impl Fn(&Reply) -> bool + Send + Sync + 'static {
    move |reply: &Reply| {
        let text = reply.text().trim();
        match kind {
            ValidatorKind::AcceptAny => !text.is_empty(),
            ValidatorKind::Email => EMAIL_PATTERN.is_match(text),
            ValidatorKind::Date => DATE_PATTERN.is_match(text),
            ValidatorKind::RejectAll => false,
        }
    }
}

/// Start hook for dependent stages: splices the previous stage's accepted
/// reply into every pending step text.
fn splice_previous_reply(previous: &Reply, pending: &mut StepQueue) {
    for entry in pending.iter_mut() {
        let text = entry
            .step()
            .text
            .replace(PREVIOUS_REPLY_PLACEHOLDER, previous.text());
        entry.step_mut().text = text;
    }
}

fn completion_logger(
    campaign: String,
    stage: String,
) -> impl Fn(&Reply) + Send + Sync + 'static {
    move |reply: &Reply| {
        info!(
            campaign = campaign.as_str(),
            stage = stage.as_str(),
            endpoint = %reply.endpoint(),
            reply = reply.text(),
            "campaign stage completed"
        );
    }
}

fn render_user(template: &str, user: &str) -> String {
    template.replace(USER_PLACEHOLDER, user)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
