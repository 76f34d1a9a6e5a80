//! Choice gating on inventory, flags and perks.

use crate::content::{ContentBundle, Requirements};
use crate::state::PlayerState;
use serde::{Deserialize, Serialize};

/// Whether a choice can be taken right now, and if not, why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl Verdict {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Check a choice's requirements against the player.
///
/// Items are checked first, then flags, then perks. Evaluation stops at the
/// first unmet entry and the reason names only that entry.
pub fn evaluate(
    requirements: Option<&Requirements>,
    state: &PlayerState,
    bundle: &ContentBundle,
) -> Verdict {
    let Some(requirements) = requirements else {
        return Verdict::allowed();
    };
    let requires = bundle.ui.get_or("requires", "Requires");

    if let Some(item) = requirements.items.iter().find(|id| !state.has_item(id)) {
        return Verdict::denied(format!("{requires}: {item}"));
    }

    if let Some(flag) = requirements.flags.iter().find(|f| !state.has_flag(f)) {
        return Verdict::denied(format!("{requires}: {flag}"));
    }

    if let Some(perk) = requirements.perks.iter().find(|p| !state.has_perk(p)) {
        return Verdict::denied(format!("{requires}: {}", bundle.perk_name(perk)));
    }

    Verdict::allowed()
}
