//! Deployable artifact (material) model
//!
//! A [`Material`] is one candidate image that can be deployed to an
//! environment. Materials arrive from the listing service in pages and are
//! then owned by a [`MaterialList`](crate::MaterialList) which enforces the
//! single-selection invariant.

use crate::approval::{ApprovalRecord, PromotionApprovalRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resource-filter verdict for a material
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterState {
    /// Passes every configured filter
    #[default]
    Allowed,
    /// Rejected by at least one filter
    Blocked,
    /// Filter evaluation failed; treated as excluded
    Error,
}

impl FilterState {
    /// Whether the material may be deployed under the configured filters
    #[inline]
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Commit/source descriptor attached to a material
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MaterialInfo {
    pub revision: String,
    pub author: String,
    pub message: String,
    pub branch: String,
    pub url: String,
    #[serde(rename = "type")]
    pub source_type: String,
    pub modified_time: Option<DateTime<Utc>>,
    pub webhook_data: Option<String>,
}

impl MaterialInfo {
    /// Whether there is any commit information worth rendering
    #[must_use]
    pub fn has_commit_info(&self) -> bool {
        !self.revision.is_empty()
            || !self.author.is_empty()
            || !self.message.is_empty()
            || self.modified_time.is_some()
            || self.webhook_data.as_deref().is_some_and(|d| !d.is_empty())
    }
}

/// A resource filter evaluated against a material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedFilter {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Release tag attached to an image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseTag {
    pub tag_name: String,
    #[serde(default)]
    pub deleted: bool,
}

/// One candidate deployable image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    /// Artifact id used in the deploy request
    pub id: u64,
    /// Immutable image identity
    pub image: String,
    /// Ordinal position, contiguous across appended pages
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub is_selected: bool,
    #[serde(default)]
    pub filter_state: FilterState,
    #[serde(default)]
    pub vulnerable: bool,
    #[serde(default)]
    pub deployed: bool,
    #[serde(default)]
    pub latest: bool,
    #[serde(default)]
    pub running_on_parent_cd: bool,
    #[serde(default)]
    pub material_info: Vec<MaterialInfo>,
    #[serde(default)]
    pub applied_filters: Vec<AppliedFilter>,
    #[serde(default)]
    pub user_approval_metadata: Option<ApprovalRecord>,
    #[serde(default)]
    pub promotion_approval_metadata: Option<PromotionApprovalRecord>,
    #[serde(default)]
    pub image_release_tags: Vec<ReleaseTag>,
    /// Workflow run that produced this deployment (rollback lists only)
    #[serde(default)]
    pub wfr_id: Option<u64>,
    #[serde(default)]
    pub deployed_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deployed_by: Option<String>,
}

impl Material {
    /// Create a material with default attributes
    #[inline]
    #[must_use]
    pub fn new(id: u64, image: impl Into<String>, index: usize) -> Self {
        Self {
            id,
            image: image.into(),
            index,
            is_selected: false,
            filter_state: FilterState::Allowed,
            vulnerable: false,
            deployed: false,
            latest: false,
            running_on_parent_cd: false,
            material_info: Vec::new(),
            applied_filters: Vec::new(),
            user_approval_metadata: None,
            promotion_approval_metadata: None,
            image_release_tags: Vec::new(),
            wfr_id: None,
            deployed_time: None,
            deployed_by: None,
        }
    }

    /// With filter state
    #[inline]
    #[must_use]
    pub fn with_filter_state(mut self, state: FilterState) -> Self {
        self.filter_state = state;
        self
    }

    /// With approval record
    #[inline]
    #[must_use]
    pub fn with_approval(mut self, record: ApprovalRecord) -> Self {
        self.user_approval_metadata = Some(record);
        self
    }

    /// Mark as the currently deployed, latest image
    #[inline]
    #[must_use]
    pub fn deployed_latest(mut self) -> Self {
        self.deployed = true;
        self.latest = true;
        self
    }

    /// Mark as vulnerable
    #[inline]
    #[must_use]
    pub fn vulnerable(mut self) -> Self {
        self.vulnerable = true;
        self
    }

    /// With release tags
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image_release_tags = tags
            .into_iter()
            .map(|t| ReleaseTag {
                tag_name: t.into(),
                deleted: false,
            })
            .collect();
        self
    }

    /// With workflow run id
    #[inline]
    #[must_use]
    pub fn with_wfr_id(mut self, wfr_id: u64) -> Self {
        self.wfr_id = Some(wfr_id);
        self
    }

    /// Already deployed and latest; pinned at the head of the first page
    #[inline]
    #[must_use]
    pub fn is_consumed_pin(&self) -> bool {
        self.deployed && self.latest
    }

    /// Whether the image carries the given (non-deleted) release tag
    #[must_use]
    pub fn has_tag(&self, tag_name: &str) -> bool {
        self.image_release_tags
            .iter()
            .any(|t| !t.deleted && t.tag_name == tag_name)
    }

    /// Whether any source info should be shown for this card
    #[must_use]
    pub fn is_material_info_available(&self) -> bool {
        self.material_info.iter().any(MaterialInfo::has_commit_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_deserializes_with_defaults() {
        let json = r#"{"id": 7, "image": "registry/app:abc123"}"#;
        let mat: Material = serde_json::from_str(json).unwrap();
        assert_eq!(mat.id, 7);
        assert_eq!(mat.filter_state, FilterState::Allowed);
        assert!(!mat.is_selected);
        assert!(mat.user_approval_metadata.is_none());
    }

    #[test]
    fn filter_state_wire_names() {
        let state: FilterState = serde_json::from_str("\"BLOCKED\"").unwrap();
        assert_eq!(state, FilterState::Blocked);
        assert!(!state.is_allowed());
    }

    #[test]
    fn consumed_pin_requires_both_flags() {
        let mut mat = Material::new(1, "img:1", 0);
        mat.deployed = true;
        assert!(!mat.is_consumed_pin());
        assert!(mat.deployed_latest().is_consumed_pin());
    }

    #[test]
    fn deleted_tags_do_not_match() {
        let mut mat = Material::new(1, "img:1", 0).with_tags(["v1"]);
        assert!(mat.has_tag("v1"));
        mat.image_release_tags[0].deleted = true;
        assert!(!mat.has_tag("v1"));
    }
}
