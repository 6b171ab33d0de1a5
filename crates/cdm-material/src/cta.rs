//! Per-material call-to-action derivation
//!
//! Exactly one [`MaterialCta`] applies to a material. Rules are checked in
//! order: excluded, vulnerable, disabled, selected, selectable.

use crate::approval::{is_approval_requester, is_image_approver};
use crate::material::Material;
use serde::Serialize;

pub const EXCLUDED_LABEL: &str = "Excluded";
pub const SECURITY_ISSUES_LABEL: &str = "Security Issues Found";
pub const SELECT_LABEL: &str = "SELECT";

/// Why a SELECT action is rendered disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DisabledReason {
    /// Material sits in the consumed partition
    ApprovalConsumed,
    /// Viewing user approved the image and approvers may not deploy
    ApproverCannotDeploy,
}

impl DisabledReason {
    #[must_use]
    pub fn tooltip(self) -> &'static str {
        match self {
            Self::ApprovalConsumed => {
                "An image can be deployed only once after it has been approved. This image would need to be approved again for it to be eligible for deployment."
            }
            Self::ApproverCannotDeploy => {
                "This image was approved by you. An image cannot be deployed by its approver."
            }
        }
    }
}

/// Call-to-action rendered on a material card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MaterialCta {
    /// Blocked by resource filters
    Excluded,
    /// Vulnerability scan failed
    SecurityIssues,
    /// SELECT shown but not interactive
    Disabled(DisabledReason),
    /// Checkmark
    Selected,
    /// Interactive SELECT
    Select,
}

impl MaterialCta {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Excluded => EXCLUDED_LABEL,
            Self::SecurityIssues => SECURITY_ISSUES_LABEL,
            Self::Disabled(_) | Self::Select => SELECT_LABEL,
            Self::Selected => "",
        }
    }

    #[inline]
    #[must_use]
    pub fn is_interactive(self) -> bool {
        matches!(self, Self::Select | Self::Selected)
    }

    #[inline]
    #[must_use]
    pub fn tooltip(self) -> Option<&'static str> {
        match self {
            Self::Disabled(reason) => Some(reason.tooltip()),
            _ => None,
        }
    }
}

/// Context shared by every card in one render pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CtaContext {
    /// Card belongs to the consumed partition
    pub in_consumed_group: bool,
    /// Pipeline allows approvers to deploy their own approvals
    pub can_approver_deploy: bool,
}

impl CtaContext {
    #[inline]
    #[must_use]
    pub fn consumed(mut self) -> Self {
        self.in_consumed_group = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_can_approver_deploy(mut self, allowed: bool) -> Self {
        self.can_approver_deploy = allowed;
        self
    }
}

/// Derive the CTA for one material
#[must_use]
pub fn material_cta(mat: &Material, ctx: &CtaContext) -> MaterialCta {
    if !mat.filter_state.is_allowed() {
        return MaterialCta::Excluded;
    }
    if mat.vulnerable {
        return MaterialCta::SecurityIssues;
    }
    if ctx.in_consumed_group {
        return MaterialCta::Disabled(DisabledReason::ApprovalConsumed);
    }
    if !ctx.can_approver_deploy && is_image_approver(mat.user_approval_metadata.as_ref()) {
        return MaterialCta::Disabled(DisabledReason::ApproverCannotDeploy);
    }
    if mat.is_selected {
        return MaterialCta::Selected;
    }
    MaterialCta::Select
}

/// Whether the "expire approval" action is offered next to the CTA
///
/// Only the user who requested the approval may expire it, and only for
/// selectable lists of materials they did not approve themselves.
#[must_use]
pub fn can_expire_approval(
    mat: &Material,
    ctx: &CtaContext,
    requested_user_id: u64,
    selectable_list: bool,
) -> bool {
    let record = mat.user_approval_metadata.as_ref();
    selectable_list
        && is_approval_requester(record, requested_user_id)
        && !is_image_approver(record)
        && !ctx.in_consumed_group
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalRecord;
    use crate::material::FilterState;

    #[test]
    fn excluded_wins_over_everything() {
        let mut mat = Material::new(1, "a", 0)
            .with_filter_state(FilterState::Error)
            .vulnerable();
        mat.is_selected = true;
        assert_eq!(material_cta(&mat, &CtaContext::default()), MaterialCta::Excluded);
    }

    #[test]
    fn vulnerable_before_disabled() {
        let mat = Material::new(1, "a", 0).vulnerable();
        let ctx = CtaContext::default().consumed();
        assert_eq!(material_cta(&mat, &ctx), MaterialCta::SecurityIssues);
    }

    #[test]
    fn consumed_group_is_disabled_with_tooltip() {
        let mat = Material::new(1, "a", 0);
        let cta = material_cta(&mat, &CtaContext::default().consumed());
        assert_eq!(cta, MaterialCta::Disabled(DisabledReason::ApprovalConsumed));
        assert!(cta.tooltip().unwrap().starts_with("An image can be deployed only once"));
        assert_eq!(cta.label(), "SELECT");
    }

    #[test]
    fn approver_rule_respects_pipeline_setting() {
        let mat = Material::new(1, "a", 0)
            .with_approval(ApprovalRecord::approved().approved_by_current_user());
        assert_eq!(
            material_cta(&mat, &CtaContext::default()),
            MaterialCta::Disabled(DisabledReason::ApproverCannotDeploy)
        );
        let ctx = CtaContext::default().with_can_approver_deploy(true);
        assert_eq!(material_cta(&mat, &ctx), MaterialCta::Select);
    }

    #[test]
    fn selected_shows_checkmark() {
        let mut mat = Material::new(1, "a", 0);
        mat.is_selected = true;
        let cta = material_cta(&mat, &CtaContext::default());
        assert_eq!(cta, MaterialCta::Selected);
        assert!(cta.is_interactive());
    }

    #[test]
    fn expire_approval_only_for_requester() {
        let mat = Material::new(1, "a", 0).with_approval(ApprovalRecord::approved().requested_by(9));
        let ctx = CtaContext::default();
        assert!(can_expire_approval(&mat, &ctx, 9, true));
        assert!(!can_expire_approval(&mat, &ctx, 10, true));
        assert!(!can_expire_approval(&mat, &ctx, 9, false));
        assert!(!can_expire_approval(&mat, &ctx.consumed(), 9, true));
    }
}
