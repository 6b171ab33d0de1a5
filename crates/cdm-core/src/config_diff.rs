//! Deployment configuration diff snapshot
//!
//! The diff is keyed by `(app, env, pipeline, workflow run, rollback)` and
//! refetched whenever the selected material's workflow run changes. A
//! response is applied only while its key is still the one being loaded,
//! so the latest request always wins.

use crate::error::ServiceError;
use crate::types::DeployConfigOption;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of one config-diff fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigDiffKey {
    pub app_id: u64,
    pub env_id: u64,
    pub pipeline_id: u64,
    pub wfr_id: Option<u64>,
    pub is_rollback: bool,
}

/// One resolved deployment configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentConfig {
    pub deployment_template: Option<String>,
    pub config_maps: Vec<String>,
    pub secrets: Vec<String>,
    pub pipeline_strategy: Option<String>,
}

impl DeploymentConfig {
    #[must_use]
    pub fn with_template(template: impl Into<String>) -> Self {
        Self {
            deployment_template: Some(template.into()),
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn has_template(&self) -> bool {
        self.deployment_template
            .as_deref()
            .is_some_and(|t| !t.is_empty())
    }
}

/// Earlier deployment of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousDeployment {
    pub wfr_id: u64,
    #[serde(default)]
    pub deployed_on: Option<DateTime<Utc>>,
}

/// Payload of the config-diff collaborator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigDiffData {
    /// Newest first
    pub previous_deployments: Vec<PreviousDeployment>,
    /// Config of the most recent deployment
    pub recent: Option<DeploymentConfig>,
    /// Config of the deployment that produced the selected material
    pub specific: Option<DeploymentConfig>,
    /// Last saved config
    pub latest: Option<DeploymentConfig>,
    pub diff_found: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum DiffState {
    #[default]
    Idle,
    Loading(ConfigDiffKey),
    Ready(ConfigDiffKey, ConfigDiffData),
    Failed(ConfigDiffKey, ServiceError),
}

/// Current config-diff state as seen by the trigger controller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDiffSnapshot {
    state: DiffState,
}

impl ConfigDiffSnapshot {
    /// Snapshot already resolved with `data`
    #[must_use]
    pub fn ready(key: ConfigDiffKey, data: ConfigDiffData) -> Self {
        Self {
            state: DiffState::Ready(key, data),
        }
    }

    /// Start loading `key`
    ///
    /// Returns `false` when `key` is already loading or loaded, in which
    /// case no fetch is needed.
    pub fn begin(&mut self, key: ConfigDiffKey) -> bool {
        if self.key() == Some(key) && !matches!(self.state, DiffState::Failed(..)) {
            return false;
        }
        self.state = DiffState::Loading(key);
        true
    }

    /// Apply a response; ignored unless `key` is the one being loaded
    pub fn complete(&mut self, key: ConfigDiffKey, result: Result<ConfigDiffData, ServiceError>) -> bool {
        if self.state != DiffState::Loading(key) {
            tracing::debug!(?key, "discarding stale config diff response");
            return false;
        }
        self.state = match result {
            Ok(data) => DiffState::Ready(key, data),
            Err(err) => DiffState::Failed(key, err),
        };
        true
    }

    /// Forget any loaded diff
    pub fn reset(&mut self) {
        self.state = DiffState::Idle;
    }

    #[must_use]
    pub fn key(&self) -> Option<ConfigDiffKey> {
        match &self.state {
            DiffState::Idle => None,
            DiffState::Loading(k) | DiffState::Ready(k, _) | DiffState::Failed(k, _) => Some(*k),
        }
    }

    /// Not yet resolved (never fetched counts as loading)
    #[inline]
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self.state, DiffState::Idle | DiffState::Loading(_))
    }

    #[must_use]
    pub fn data(&self) -> Option<&ConfigDiffData> {
        match &self.state {
            DiffState::Ready(_, data) => Some(data),
            _ => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&ServiceError> {
        match &self.state {
            DiffState::Failed(_, err) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub fn diff_found(&self) -> bool {
        self.data().is_some_and(|d| d.diff_found)
    }

    #[must_use]
    pub fn no_last_deployment_config(&self) -> bool {
        self.data()
            .is_some_and(|d| d.previous_deployments.is_empty())
    }

    #[must_use]
    pub fn no_specific_deployment_config(&self) -> bool {
        self.data().is_some_and(|d| d.specific.is_none())
    }

    /// Workflow run of the most recent deployment
    #[must_use]
    pub fn last_deployment_wfr_id(&self) -> Option<u64> {
        self.data()
            .and_then(|d| d.previous_deployments.first())
            .map(|p| p.wfr_id)
    }

    #[must_use]
    pub fn is_config_present(&self, option: DeployConfigOption) -> bool {
        let Some(data) = self.data() else {
            return false;
        };
        match option {
            DeployConfigOption::SpecificTrigger => {
                data.specific.as_ref().is_some_and(DeploymentConfig::has_template)
            }
            DeployConfigOption::LastSaved => {
                data.latest.as_ref().is_some_and(DeploymentConfig::has_template)
            }
            DeployConfigOption::LatestTrigger => false,
        }
    }

    fn has_recent_template(&self) -> bool {
        self.data()
            .and_then(|d| d.recent.as_ref())
            .is_some_and(DeploymentConfig::has_template)
    }

    #[must_use]
    pub fn can_deploy_with_config(&self, option: DeployConfigOption) -> bool {
        (option == DeployConfigOption::LatestTrigger && self.has_recent_template())
            || self.is_config_present(option)
    }

    #[must_use]
    pub fn can_review_config(&self, option: DeployConfigOption) -> bool {
        let no_recent = self.data().is_some_and(|d| d.recent.is_none());
        let reviewable = self.has_recent_template()
            && (option == DeployConfigOption::LatestTrigger || self.is_config_present(option));
        reviewable || no_recent
    }
}
