//! Collaborator contracts
//!
//! Every external dependency of the session is a trait object so tests and
//! the CLI simulator can supply in-memory implementations. Async requests
//! receive the cancellation token of the scope they run under.

use crate::config_diff::{ConfigDiffData, ConfigDiffKey};
use crate::error::ServiceError;
use crate::notify::Toast;
use crate::query::TriggerQuery;
use crate::types::{
    DeployRequest, DeployResponse, DeploymentWindow, ManifestRequest, MaterialListKind,
    MaterialsPage, PageRequest, PolicyConsequences, RuntimeParam, RuntimeParamsErrorState,
    StageType,
};
use async_trait::async_trait;
use cdm_material::Material;
use tokio_util::sync::CancellationToken;

/// Paginated material listing
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MaterialService: Send + Sync {
    async fn fetch_materials(
        &self,
        kind: MaterialListKind,
        pipeline_id: u64,
        stage: StageType,
        page: PageRequest,
        cancel: CancellationToken,
    ) -> Result<MaterialsPage, ServiceError>;
}

/// Deployment-window metadata (optional collaborator)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeploymentWindowService: Send + Sync {
    async fn fetch_deployment_window(
        &self,
        app_id: u64,
        env_id: u64,
    ) -> Result<DeploymentWindow, ServiceError>;
}

/// Policy consequences (optional collaborator)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PolicyConsequenceService: Send + Sync {
    async fn fetch_policy_consequences(
        &self,
        app_id: u64,
        env_id: u64,
    ) -> Result<PolicyConsequences, ServiceError>;
}

/// Deploy trigger
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeployService: Send + Sync {
    async fn trigger_deploy(
        &self,
        request: DeployRequest,
        cancel: CancellationToken,
    ) -> Result<DeployResponse, ServiceError>;
}

/// Deployment configuration diff for a selection
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigDiffService: Send + Sync {
    async fn fetch_config_diff(&self, key: ConfigDiffKey) -> Result<ConfigDiffData, ServiceError>;
}

/// Manifest download link builder (virtual environments)
#[cfg_attr(test, mockall::automock)]
pub trait ManifestDownloader: Send + Sync {
    fn download_manifest_url(&self, request: ManifestRequest) -> String;
}

/// Runtime parameter validation
#[cfg_attr(test, mockall::automock)]
pub trait RuntimeParamsValidator: Send + Sync {
    fn validate(&self, params: &[RuntimeParam]) -> RuntimeParamsErrorState;
}

/// Toast and global error presenter
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, toast: Toast);

    /// Global error presenter for generic failures
    fn show_error(&self, error: &ServiceError);
}

/// Routing surface
#[cfg_attr(test, mockall::automock)]
pub trait Navigator: Send + Sync {
    /// Replace the query string of the current route
    fn push_query(&self, query: &TriggerQuery);

    fn close_modal(&self);
}

/// Parent aggregator in the bulk deploy flow
#[cfg_attr(test, mockall::automock)]
pub trait BulkAggregator: Send + Sync {
    fn update_materials(&self, materials: &[Material]);
}
