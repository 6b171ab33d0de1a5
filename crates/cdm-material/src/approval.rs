//! Approval metadata attached to materials
//!
//! Approval-gated pipelines only allow deploying images whose approval
//! runtime state is [`ApprovalRuntimeState::APPROVED`]. Every other state
//! (never requested, pending, already consumed by a deployment) puts the
//! image in the consumed partition.

use serde::{Deserialize, Serialize};

/// Numeric approval runtime state as reported by the listing service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalRuntimeState(pub u8);

impl ApprovalRuntimeState {
    /// No approval requested
    pub const INIT: Self = Self(0);
    /// Approval requested, waiting on approvers
    pub const REQUESTED: Self = Self(1);
    /// Approved and not yet consumed
    pub const APPROVED: Self = Self(2);
    /// Approval already used by a deployment
    pub const CONSUMED: Self = Self(3);

    #[inline]
    #[must_use]
    pub fn is_approved(self) -> bool {
        self == Self::APPROVED
    }
}

/// User reference inside approval metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalUser {
    pub user_id: u64,
    #[serde(default)]
    pub user_email: String,
}

/// Per-material approval record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    #[serde(default)]
    pub requested_user_data: Option<ApprovalUser>,
    #[serde(default)]
    pub approval_runtime_state: ApprovalRuntimeState,
    #[serde(default)]
    pub approved_users_data: Vec<ApprovalUser>,
    /// Whether the viewing user is one of the approvers
    #[serde(default)]
    pub has_current_user_approved: bool,
}

impl ApprovalRecord {
    /// Record with the given runtime state and nothing else
    #[inline]
    #[must_use]
    pub fn with_state(state: ApprovalRuntimeState) -> Self {
        Self {
            approval_runtime_state: state,
            ..Self::default()
        }
    }

    /// Approved record
    #[inline]
    #[must_use]
    pub fn approved() -> Self {
        Self::with_state(ApprovalRuntimeState::APPROVED)
    }

    /// Requested by the given user
    #[inline]
    #[must_use]
    pub fn requested_by(mut self, user_id: u64) -> Self {
        self.requested_user_data = Some(ApprovalUser {
            user_id,
            user_email: String::new(),
        });
        self
    }

    /// Approved by the viewing user
    #[inline]
    #[must_use]
    pub fn approved_by_current_user(mut self) -> Self {
        self.has_current_user_approved = true;
        self
    }
}

/// Promotion approval record (image promoted from another environment)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionApprovalRecord {
    #[serde(default)]
    pub promoted_from: Option<String>,
    #[serde(default)]
    pub promoted_from_type: Option<String>,
    #[serde(default)]
    pub requested_user_data: Option<ApprovalUser>,
    #[serde(default)]
    pub approved_users_data: Vec<ApprovalUser>,
    #[serde(default)]
    pub policy_name: Option<String>,
}

impl PromotionApprovalRecord {
    /// Emails of every approver
    #[must_use]
    pub fn approver_emails(&self) -> Vec<&str> {
        self.approved_users_data
            .iter()
            .map(|u| u.user_email.as_str())
            .collect()
    }
}

/// Approval policy configuration for the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserApprovalConfig {
    #[serde(default)]
    pub required_count: u32,
}

impl UserApprovalConfig {
    /// Approval is configured once at least one approval is required
    #[inline]
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.required_count > 0
    }
}

/// Whether the viewing user is the one who requested approval
#[must_use]
pub fn is_approval_requester(record: Option<&ApprovalRecord>, requested_user_id: u64) -> bool {
    record
        .and_then(|r| r.requested_user_data.as_ref())
        .is_some_and(|u| u.user_id == requested_user_id)
}

/// Whether the viewing user approved this image
#[inline]
#[must_use]
pub fn is_image_approver(record: Option<&ApprovalRecord>) -> bool {
    record.is_some_and(|r| r.has_current_user_approved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_state_is_numeric_on_the_wire() {
        let record: ApprovalRecord =
            serde_json::from_str(r#"{"approvalRuntimeState": 2}"#).unwrap();
        assert!(record.approval_runtime_state.is_approved());

        let json = serde_json::to_string(&ApprovalRuntimeState::CONSUMED).unwrap();
        assert_eq!(json, "3");
    }

    #[test]
    fn requester_matches_by_user_id() {
        let record = ApprovalRecord::approved().requested_by(42);
        assert!(is_approval_requester(Some(&record), 42));
        assert!(!is_approval_requester(Some(&record), 7));
        assert!(!is_approval_requester(None, 42));
    }

    #[test]
    fn approval_config_requires_positive_count() {
        assert!(!UserApprovalConfig::default().is_configured());
        assert!(UserApprovalConfig { required_count: 1 }.is_configured());
    }
}
