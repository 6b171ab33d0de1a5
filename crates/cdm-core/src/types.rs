//! Core types shared by the session components

use cdm_material::{AppliedFilter, Material, UserApprovalConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Default number of materials per page
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Pipeline stage being triggered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageType {
    #[serde(rename = "PRECD")]
    PreCd,
    #[default]
    #[serde(rename = "CD")]
    Cd,
    #[serde(rename = "POSTCD")]
    PostCd,
}

impl StageType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreCd => "PRECD",
            Self::Cd => "CD",
            Self::PostCd => "POSTCD",
        }
    }

    /// Deploy button label for the stage
    #[must_use]
    pub fn button_label(self) -> &'static str {
        match self {
            Self::Cd => "Deploy",
            Self::PreCd | Self::PostCd => "Trigger Stage",
        }
    }

    #[inline]
    #[must_use]
    pub fn is_pre_or_post(self) -> bool {
        matches!(self, Self::PreCd | Self::PostCd)
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the trigger view was opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MaterialType {
    /// Regular trigger: pick any eligible image
    #[default]
    InputList,
    /// Rollback to a previously deployed image
    RollbackList,
    /// Pick-image trigger without a source material
    None,
}

impl MaterialType {
    #[must_use]
    pub fn list_kind(self) -> MaterialListKind {
        match self {
            Self::RollbackList => MaterialListKind::Rollback,
            Self::InputList | Self::None => MaterialListKind::CdMaterials,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_rollback(self) -> bool {
        matches!(self, Self::RollbackList)
    }
}

/// Which listing the material service serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaterialListKind {
    CdMaterials,
    Rollback,
}

/// Deployment configuration to deploy with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeployConfigOption {
    #[default]
    #[serde(rename = "LAST_SAVED_CONFIG")]
    LastSaved,
    #[serde(rename = "SPECIFIC_TRIGGER_CONFIG")]
    SpecificTrigger,
    #[serde(rename = "LATEST_TRIGGER_CONFIG")]
    LatestTrigger,
}

impl DeployConfigOption {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LastSaved => "LAST_SAVED_CONFIG",
            Self::SpecificTrigger => "SPECIFIC_TRIGGER_CONFIG",
            Self::LatestTrigger => "LATEST_TRIGGER_CONFIG",
        }
    }
}

impl fmt::Display for DeployConfigOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown deploy-config value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown deployment config option {0:?}")]
pub struct ParseDeployConfigError(pub String);

impl FromStr for DeployConfigOption {
    type Err = ParseDeployConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LAST_SAVED_CONFIG" => Ok(Self::LastSaved),
            "SPECIFIC_TRIGGER_CONFIG" => Ok(Self::SpecificTrigger),
            "LATEST_TRIGGER_CONFIG" => Ok(Self::LatestTrigger),
            other => Err(ParseDeployConfigError(other.to_string())),
        }
    }
}

/// Deployment-window verdict for the current user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionState {
    Allowed,
    Partial,
    Blocked,
}

/// Deployment-window metadata for an app/env pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentWindow {
    pub user_action_state: Option<ActionState>,
    #[serde(rename = "type")]
    pub window_type: Option<String>,
    pub is_active: bool,
    pub name: String,
    pub calculated_timestamp: Option<DateTime<Utc>>,
}

impl DeploymentWindow {
    #[must_use]
    pub fn with_state(state: ActionState) -> Self {
        Self {
            user_action_state: Some(state),
            ..Self::default()
        }
    }

    /// Deploy needs an explicit confirmation first
    #[inline]
    #[must_use]
    pub fn requires_confirmation(&self) -> bool {
        self.user_action_state
            .is_some_and(|s| s != ActionState::Allowed)
    }

    #[inline]
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.user_action_state == Some(ActionState::Blocked)
    }
}

/// How the target environment receives deployments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentAppType {
    #[default]
    Helm,
    ArgoCd,
    ManifestDownload,
    ManifestPush,
}

/// Identity of the pipeline being triggered
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTarget {
    pub app_id: Option<u64>,
    pub app_name: String,
    pub env_id: u64,
    pub env_name: String,
    pub pipeline_id: Option<u64>,
    pub stage_type: StageType,
    pub material_type: MaterialType,
    pub is_virtual_environment: bool,
    pub deployment_app_type: DeploymentAppType,
    /// Opened from the bulk deploy flow
    pub is_from_bulk_cd: bool,
}

impl PipelineTarget {
    #[must_use]
    pub fn new(app_id: u64, env_id: u64, pipeline_id: u64) -> Self {
        Self {
            app_id: Some(app_id),
            env_id,
            pipeline_id: Some(pipeline_id),
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn with_stage(mut self, stage: StageType) -> Self {
        self.stage_type = stage;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_material_type(mut self, material_type: MaterialType) -> Self {
        self.material_type = material_type;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_env_name(mut self, name: impl Into<String>) -> Self {
        self.env_name = name.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn virtual_env(mut self, app_type: DeploymentAppType) -> Self {
        self.is_virtual_environment = true;
        self.deployment_app_type = app_type;
        self
    }

    #[inline]
    #[must_use]
    pub fn from_bulk(mut self) -> Self {
        self.is_from_bulk_cd = true;
        self
    }

    /// Manifest push failures get per-item toasts
    #[inline]
    #[must_use]
    pub fn is_manifest_push(&self) -> bool {
        self.is_virtual_environment && self.deployment_app_type == DeploymentAppType::ManifestPush
    }

    #[inline]
    #[must_use]
    pub fn is_manifest_download(&self) -> bool {
        self.is_virtual_environment
            && self.deployment_app_type == DeploymentAppType::ManifestDownload
    }

    /// Deployment steps page for this pipeline
    #[must_use]
    pub fn deployment_steps_path(&self) -> String {
        format!(
            "/app/{}/cd-details/{}/{}",
            self.app_id.unwrap_or_default(),
            self.env_id,
            self.pipeline_id.unwrap_or_default()
        )
    }
}

/// One page request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub offset: usize,
    pub size: usize,
    pub search: Option<String>,
}

impl PageRequest {
    #[must_use]
    pub fn first(size: usize, search: Option<String>) -> Self {
        Self {
            offset: 0,
            size,
            search,
        }
    }
}

/// Runtime parameter passed to pre/post stages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeParam {
    pub key: String,
    pub value: String,
    pub required: bool,
}

impl RuntimeParam {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            required: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Validation state of the runtime parameter table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeParamsErrorState {
    pub is_valid: bool,
    /// Error message per parameter key
    #[serde(default)]
    pub cell_errors: BTreeMap<String, String>,
}

impl Default for RuntimeParamsErrorState {
    fn default() -> Self {
        Self {
            is_valid: true,
            cell_errors: BTreeMap::new(),
        }
    }
}

impl RuntimeParamsErrorState {
    #[must_use]
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        let mut cell_errors = BTreeMap::new();
        cell_errors.insert(key.into(), message.into());
        Self {
            is_valid: false,
            cell_errors,
        }
    }
}

/// Per-stage policy block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StageBlock {
    pub is_blocked: bool,
}

/// Policy consequences for the CD node of a pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConsequences {
    pub pre: StageBlock,
    pub node: StageBlock,
    pub post: StageBlock,
}

impl PolicyConsequences {
    #[must_use]
    pub fn is_blocked(&self, stage: StageType) -> bool {
        match stage {
            StageType::PreCd => self.pre.is_blocked,
            StageType::Cd => self.node.is_blocked,
            StageType::PostCd => self.post.is_blocked,
        }
    }
}

/// Response of the material listing service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MaterialsPage {
    pub materials: Vec<Material>,
    pub total_count: usize,
    pub tags_editable: bool,
    pub app_release_tag_names: Vec<String>,
    pub runtime_params: Vec<RuntimeParam>,
    pub resource_filters: Vec<AppliedFilter>,
    pub user_approval_config: Option<UserApprovalConfig>,
    pub can_approver_deploy: bool,
    pub requested_user_id: u64,
    pub hide_image_tagging_hard_delete: bool,
    /// Viewing user is exempt from the approval policy
    pub is_exception_user: bool,
}

impl MaterialsPage {
    #[must_use]
    pub fn new(materials: Vec<Material>, total_count: usize) -> Self {
        Self {
            materials,
            total_count,
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn is_approval_configured(&self) -> bool {
        self.user_approval_config
            .is_some_and(|c| c.is_configured())
    }
}

/// Deploy request sent to the trigger service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub pipeline_id: u64,
    pub ci_artifact_id: u64,
    pub app_id: u64,
    pub stage_type: StageType,
    pub deployment_with_config: Option<DeployConfigOption>,
    pub workflow_run_id: Option<u64>,
    pub runtime_params: Vec<RuntimeParam>,
    pub is_rollback_trigger: bool,
}

/// Successful deploy response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployResponse {
    pub helm_package_name: Option<String>,
}

/// Input for building a manifest download link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRequest {
    pub app_id: u64,
    pub env_id: u64,
    pub app_name: String,
    pub helm_package_name: Option<String>,
    pub cd_workflow_type: StageType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_config_round_trips_through_str() {
        for opt in [
            DeployConfigOption::LastSaved,
            DeployConfigOption::SpecificTrigger,
            DeployConfigOption::LatestTrigger,
        ] {
            assert_eq!(opt.as_str().parse::<DeployConfigOption>(), Ok(opt));
        }
        assert!("NOPE".parse::<DeployConfigOption>().is_err());
    }

    #[test]
    fn window_confirmation_only_when_not_allowed() {
        assert!(!DeploymentWindow::default().requires_confirmation());
        assert!(!DeploymentWindow::with_state(ActionState::Allowed).requires_confirmation());
        assert!(DeploymentWindow::with_state(ActionState::Partial).requires_confirmation());
        assert!(DeploymentWindow::with_state(ActionState::Blocked).is_blocked());
    }

    #[test]
    fn policy_block_per_stage() {
        let consequences = PolicyConsequences {
            post: StageBlock { is_blocked: true },
            ..PolicyConsequences::default()
        };
        assert!(consequences.is_blocked(StageType::PostCd));
        assert!(!consequences.is_blocked(StageType::Cd));
    }

    #[test]
    fn materials_page_accepts_camel_case() {
        let json = r#"{
            "materials": [{"id": 1, "image": "app:1"}],
            "totalCount": 25,
            "userApprovalConfig": {"requiredCount": 1},
            "canApproverDeploy": true
        }"#;
        let page: MaterialsPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.total_count, 25);
        assert!(page.is_approval_configured());
        assert!(page.can_approver_deploy);
    }

    #[test]
    fn steps_path() {
        let target = PipelineTarget::new(4, 7, 19);
        assert_eq!(target.deployment_steps_path(), "/app/4/cd-details/7/19");
    }
}
