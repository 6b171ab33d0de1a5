//! Material fetcher
//!
//! Two request kinds with separate cancellation scopes:
//! - first page: superseded whenever the fetch identity changes or the
//!   list is refreshed; at most one is outstanding per identity
//! - older pages: guarded by a busy flag, a second request while one is
//!   outstanding is rejected instead of cancelling the first

use crate::cancel::{run_cancellable, CancelScope};
use crate::error::{FetchError, ServiceError};
use crate::notify::Toast;
use crate::services::{DeploymentWindowService, MaterialService, PolicyConsequenceService};
use crate::types::{
    DeploymentWindow, MaterialListKind, MaterialsPage, PageRequest, PolicyConsequences, StageType,
};
use cdm_material::{FilterView, Material};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identity of a first-page fetch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchParams {
    pub pipeline_id: u64,
    pub stage_type: StageType,
    pub list_kind: MaterialListKind,
    pub search: Option<String>,
}

/// Companion requests issued alongside the first page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Companions {
    pub app_id: u64,
    pub env_id: u64,
    /// Bulk flows fetch the window once for all apps
    pub skip_window: bool,
}

/// Result of a first-page fetch
#[derive(Debug, Clone, PartialEq)]
pub enum InitialLoad {
    Loaded {
        page: MaterialsPage,
        window: Option<DeploymentWindow>,
        policy: Option<PolicyConsequences>,
    },
    /// Policy consequences block this stage; no materials were kept
    TriggerBlocked { policy: PolicyConsequences },
}

/// Result of a "load older" request
#[derive(Debug, Clone, PartialEq)]
pub enum OlderPage {
    Fetched(MaterialsPage),
    /// Another older-page request is outstanding
    Busy,
}

pub struct MaterialFetcher {
    service: Arc<dyn MaterialService>,
    window_service: Option<Arc<dyn DeploymentWindowService>>,
    policy_service: Option<Arc<dyn PolicyConsequenceService>>,
    fetch_scope: CancelScope,
    page_scope: CancelScope,
    loading_more: AtomicBool,
    page_size: usize,
}

/// Clears the busy flag when the older-page request ends, however it ends
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl MaterialFetcher {
    #[must_use]
    pub fn new(service: Arc<dyn MaterialService>, page_size: usize) -> Self {
        Self {
            service,
            window_service: None,
            policy_service: None,
            fetch_scope: CancelScope::new("fetch"),
            page_scope: CancelScope::new("page"),
            loading_more: AtomicBool::new(false),
            page_size,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_window_service(mut self, service: Option<Arc<dyn DeploymentWindowService>>) -> Self {
        self.window_service = service;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_policy_service(mut self, service: Option<Arc<dyn PolicyConsequenceService>>) -> Self {
        self.policy_service = service;
        self
    }

    #[inline]
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[inline]
    #[must_use]
    pub fn is_loading_more(&self) -> bool {
        self.loading_more.load(Ordering::Acquire)
    }

    /// Fetch the first page plus window metadata and policy consequences
    ///
    /// Any outstanding first-page or older-page request is cancelled first.
    ///
    /// # Errors
    /// [`FetchError::Service`] with [`ServiceError::Aborted`] when this
    /// request is itself superseded; other service errors as returned.
    pub async fn load_first_page(
        &self,
        params: &FetchParams,
        companions: Companions,
    ) -> Result<InitialLoad, FetchError> {
        let token = self.fetch_scope.renew();
        self.page_scope.renew();

        info!(
            pipeline_id = params.pipeline_id,
            stage = %params.stage_type,
            search = ?params.search,
            "loading materials"
        );

        let request = PageRequest::first(self.page_size, params.search.clone());
        let materials = run_cancellable(
            &token,
            self.service.fetch_materials(
                params.list_kind,
                params.pipeline_id,
                params.stage_type,
                request,
                token.clone(),
            ),
        );
        let window = async {
            match (&self.window_service, companions.skip_window) {
                (Some(service), false) => run_cancellable(
                    &token,
                    service.fetch_deployment_window(companions.app_id, companions.env_id),
                )
                .await
                .map(Some),
                _ => Ok(None),
            }
        };
        let policy = async {
            match &self.policy_service {
                Some(service) => run_cancellable(
                    &token,
                    service.fetch_policy_consequences(companions.app_id, companions.env_id),
                )
                .await
                .map(Some),
                None => Ok(None),
            }
        };

        let (page, window, policy) = futures::try_join!(materials, window, policy)
            .map_err(|err| log_fetch_error(params.pipeline_id, err))?;

        if let Some(policy) = policy.filter(|p| p.is_blocked(params.stage_type)) {
            info!(pipeline_id = params.pipeline_id, "trigger blocked by policy consequences");
            return Ok(InitialLoad::TriggerBlocked { policy });
        }

        debug!(
            pipeline_id = params.pipeline_id,
            count = page.materials.len(),
            total = page.total_count,
            "materials loaded"
        );
        Ok(InitialLoad::Loaded {
            page,
            window,
            policy,
        })
    }

    /// Fetch the page following `offset`
    ///
    /// # Errors
    /// Service errors as returned; aborted when the fetch identity changes
    /// while the request is outstanding.
    pub async fn load_older(&self, params: &FetchParams, offset: usize) -> Result<OlderPage, FetchError> {
        let Some(_busy) = BusyGuard::acquire(&self.loading_more) else {
            debug!(pipeline_id = params.pipeline_id, "older page already loading");
            return Ok(OlderPage::Busy);
        };

        let token = self.page_scope.current();
        info!(pipeline_id = params.pipeline_id, offset, "loading older materials");

        let request = PageRequest {
            offset,
            size: self.page_size,
            search: params.search.clone(),
        };
        let page = run_cancellable(
            &token,
            self.service.fetch_materials(
                params.list_kind,
                params.pipeline_id,
                params.stage_type,
                request,
                token.clone(),
            ),
        )
        .await
        .map_err(|err| log_fetch_error(params.pipeline_id, err))?;

        Ok(OlderPage::Fetched(page))
    }

    /// Cancel everything in flight (view teardown)
    pub fn cancel_all(&self) {
        self.fetch_scope.cancel();
        self.page_scope.cancel();
    }
}

fn log_fetch_error(pipeline_id: u64, err: ServiceError) -> FetchError {
    if err.is_aborted() {
        debug!(pipeline_id, "material request aborted");
    } else {
        warn!(pipeline_id, error = %err, "material request failed");
    }
    FetchError::Service(err)
}

/// Summary toast after appending an older page
#[must_use]
pub fn older_page_toast(
    appended: &[Material],
    resource_filters_present: bool,
    search_applied: bool,
    view: FilterView,
) -> Toast {
    let base = format!("Fetched {} images.", appended.len());
    if !resource_filters_present || search_applied {
        return Toast::success(base);
    }

    let eligible = appended
        .iter()
        .filter(|m| m.filter_state.is_allowed())
        .count();
    let detail = if eligible == 0 {
        "No new eligible images found.".to_string()
    } else {
        format!("{eligible} new eligible images found.")
    };
    let description = format!("{base} {detail}");
    match view {
        FilterView::Eligible => Toast::info(description),
        FilterView::All => Toast::success(description),
    }
}
