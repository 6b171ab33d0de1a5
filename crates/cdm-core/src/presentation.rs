//! Pure view derivations: deploy button, modal header, empty states

use crate::config_diff::ConfigDiffSnapshot;
use crate::error::TriggerError;
use crate::types::{ActionState, DeployConfigOption, DeploymentWindow, StageType};
use serde::Serialize;

pub const BLOCKED_LABEL: &str = "Deployment is blocked";
pub const ISOLATED_SUFFIX: &str = " to isolated env";

pub const TOOLTIP_NO_ELIGIBLE: &str =
    "Please select an image that passes the configured filters to deploy";
pub const TOOLTIP_DIFFERENT_IMAGE_OR_CONFIG: &str =
    "Please select a different image or configuration to deploy";
pub const TOOLTIP_DIFFERENT_CONFIG: &str = "Please select a different configuration to deploy";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum ButtonStyle {
    #[default]
    Default,
    Warning,
    Negative,
}

/// Deploy button as rendered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployButton {
    pub label: String,
    pub style: ButtonStyle,
    pub disabled: bool,
    pub loading: bool,
    pub tooltip: Option<&'static str>,
}

/// Inputs for [`deploy_button`]
#[derive(Debug, Clone, Copy)]
pub struct DeployButtonInput<'a> {
    pub stage_type: StageType,
    pub is_virtual_environment: bool,
    pub window: Option<&'a DeploymentWindow>,
    pub blocked_reason: Option<&'a TriggerError>,
    pub deploying: bool,
    pub config_to_deploy: DeployConfigOption,
    pub config_diff: &'a ConfigDiffSnapshot,
    /// Exception user deploying without the required approval
    pub deploying_without_approval: bool,
}

#[must_use]
pub fn deploy_button(input: &DeployButtonInput<'_>) -> DeployButton {
    let state = input.window.and_then(|w| w.user_action_state);
    let base = if state == Some(ActionState::Blocked) {
        BLOCKED_LABEL
    } else {
        input.stage_type.button_label()
    };
    let suffix = if input.is_virtual_environment {
        ISOLATED_SUFFIX
    } else {
        ""
    };

    let style = match state {
        Some(ActionState::Blocked) => ButtonStyle::Negative,
        Some(ActionState::Partial) => ButtonStyle::Warning,
        _ if input.deploying_without_approval => ButtonStyle::Warning,
        _ => ButtonStyle::Default,
    };

    DeployButton {
        label: format!("{base}{suffix}"),
        style,
        disabled: input.blocked_reason.is_some() || input.deploying,
        loading: input.deploying,
        tooltip: input.blocked_reason.and_then(|reason| disabled_tooltip(reason, input)),
    }
}

fn disabled_tooltip(reason: &TriggerError, input: &DeployButtonInput<'_>) -> Option<&'static str> {
    match reason {
        TriggerError::FiltersNotPassing => Some(TOOLTIP_NO_ELIGIBLE),
        TriggerError::ConfigUnavailable | TriggerError::NoLastDeploymentConfig => {
            if input.config_to_deploy == DeployConfigOption::SpecificTrigger
                && input.config_diff.no_specific_deployment_config()
            {
                Some(TOOLTIP_DIFFERENT_IMAGE_OR_CONFIG)
            } else {
                Some(TOOLTIP_DIFFERENT_CONFIG)
            }
        }
        _ => None,
    }
}

/// Modal header
#[must_use]
pub fn header_text(
    stage_type: StageType,
    is_rollback: bool,
    env_name: &str,
    is_virtual_environment: bool,
) -> String {
    if is_rollback {
        return format!("Rollback for {env_name}");
    }
    match stage_type {
        StageType::PreCd => "Pre Deployment".to_string(),
        StageType::PostCd => "Post Deployment".to_string(),
        StageType::Cd if is_virtual_environment => format!("Deploy to {env_name} (Isolated)"),
        StageType::Cd => format!("Deploy to {env_name}"),
    }
}

/// Title above the material list when no filter tabs are shown
#[must_use]
pub fn list_title(approval_configured: bool, is_rollback: bool) -> &'static str {
    if approval_configured {
        "Approved images"
    } else if is_rollback {
        "Select from previously deployed images"
    } else {
        "Select Image"
    }
}

/// Per-card presentation of one material
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterialCard {
    pub index: usize,
    pub image: String,
    pub cta_label: &'static str,
    pub cta_tooltip: Option<&'static str>,
    pub interactive: bool,
    pub can_expire_approval: bool,
    /// Only when the approval-info capability is available
    pub approval_info: Option<Vec<String>>,
    /// Only when the promotion-chip capability is available
    pub promoted_from: Option<String>,
    pub in_edit_mode: bool,
}

/// Placeholder shown instead of an empty material list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EmptyState {
    TriggerBlocked,
    /// Filters exclude every loaded image
    NoEligibleImages { can_load_more: bool },
    NoMatchingSearch,
    ApprovalEmpty { consumed_present: bool },
    NoImages { rollback: bool },
}

impl EmptyState {
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::TriggerBlocked => "Deployment is blocked",
            Self::NoEligibleImages { .. } => "No eligible image found",
            Self::NoMatchingSearch => "No matching image available",
            Self::ApprovalEmpty { .. } => "No approved images",
            Self::NoImages { rollback: true } => "No previously deployed images",
            Self::NoImages { rollback: false } => "No image available",
        }
    }
}

/// Inputs for [`empty_state`]
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyStateInput {
    pub trigger_blocked: bool,
    pub visible_count: usize,
    pub total_loaded: usize,
    pub consumed_count: usize,
    pub eligible_count: usize,
    pub resource_filters_present: bool,
    pub search_applied: bool,
    pub approval_configured: bool,
    pub no_more_images: bool,
    pub is_rollback: bool,
}

/// Empty state to show, `None` when the list has visible materials
#[must_use]
pub fn empty_state(input: &EmptyStateInput) -> Option<EmptyState> {
    if input.trigger_blocked {
        return Some(EmptyState::TriggerBlocked);
    }
    if input.visible_count > 0 {
        return None;
    }
    if input.resource_filters_present
        && input.eligible_count == 0
        && !input.search_applied
        && input.total_loaded > input.consumed_count
    {
        return Some(EmptyState::NoEligibleImages {
            can_load_more: !input.no_more_images,
        });
    }
    if input.search_applied {
        return Some(EmptyState::NoMatchingSearch);
    }
    if input.approval_configured {
        return Some(EmptyState::ApprovalEmpty {
            consumed_present: input.consumed_count > 0,
        });
    }
    Some(EmptyState::NoImages {
        rollback: input.is_rollback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(snapshot: &'a ConfigDiffSnapshot) -> DeployButtonInput<'a> {
        DeployButtonInput {
            stage_type: StageType::Cd,
            is_virtual_environment: false,
            window: None,
            blocked_reason: None,
            deploying: false,
            config_to_deploy: DeployConfigOption::LastSaved,
            config_diff: snapshot,
            deploying_without_approval: false,
        }
    }

    #[test]
    fn label_and_style_follow_window() {
        let snapshot = ConfigDiffSnapshot::default();
        assert_eq!(deploy_button(&input(&snapshot)).label, "Deploy");

        let blocked = DeploymentWindow::with_state(ActionState::Blocked);
        let button = deploy_button(&DeployButtonInput {
            window: Some(&blocked),
            is_virtual_environment: true,
            ..input(&snapshot)
        });
        assert_eq!(button.label, "Deployment is blocked to isolated env");
        assert_eq!(button.style, ButtonStyle::Negative);

        let partial = DeploymentWindow::with_state(ActionState::Partial);
        let button = deploy_button(&DeployButtonInput {
            window: Some(&partial),
            stage_type: StageType::PreCd,
            ..input(&snapshot)
        });
        assert_eq!(button.label, "Trigger Stage");
        assert_eq!(button.style, ButtonStyle::Warning);
    }

    #[test]
    fn tooltip_for_filters() {
        let snapshot = ConfigDiffSnapshot::default();
        let reason = TriggerError::FiltersNotPassing;
        let button = deploy_button(&DeployButtonInput {
            blocked_reason: Some(&reason),
            ..input(&snapshot)
        });
        assert!(button.disabled);
        assert_eq!(button.tooltip, Some(TOOLTIP_NO_ELIGIBLE));
    }

    #[test]
    fn headers() {
        assert_eq!(header_text(StageType::PreCd, false, "prod", false), "Pre Deployment");
        assert_eq!(header_text(StageType::Cd, false, "prod", true), "Deploy to prod (Isolated)");
        assert_eq!(header_text(StageType::PostCd, false, "prod", false), "Post Deployment");
        assert_eq!(header_text(StageType::Cd, true, "prod", false), "Rollback for prod");
    }

    #[test]
    fn empty_state_priority() {
        let base = EmptyStateInput {
            total_loaded: 3,
            resource_filters_present: true,
            ..EmptyStateInput::default()
        };
        assert_eq!(
            empty_state(&base),
            Some(EmptyState::NoEligibleImages { can_load_more: true })
        );
        assert_eq!(
            empty_state(&EmptyStateInput { search_applied: true, ..base }),
            Some(EmptyState::NoMatchingSearch)
        );
        assert_eq!(
            empty_state(&EmptyStateInput {
                trigger_blocked: true,
                visible_count: 2,
                ..base
            }),
            Some(EmptyState::TriggerBlocked)
        );
        assert_eq!(
            empty_state(&EmptyStateInput {
                approval_configured: true,
                consumed_count: 3,
                ..base
            }),
            Some(EmptyState::ApprovalEmpty { consumed_present: true })
        );
        assert_eq!(
            empty_state(&EmptyStateInput {
                is_rollback: true,
                ..EmptyStateInput::default()
            }),
            Some(EmptyState::NoImages { rollback: true })
        );
        assert_eq!(empty_state(&EmptyStateInput { visible_count: 1, ..base }), None);
    }
}
