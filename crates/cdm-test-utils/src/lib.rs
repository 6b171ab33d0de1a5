//! Testing utilities for the CDM workspace
//!
//! In-memory collaborators and fixtures for driving a
//! [`CdMaterialSession`] in integration tests:
//! - [`ScriptedMaterialService`]: pages sliced from a listing, optionally
//!   held until released, with scripted failures
//! - [`GatedDeployService`]: deploys that wait for [`GatedDeployService::release`]
//! - [`Harness`]: a session wired to all of the above

#![allow(missing_docs)]

use async_trait::async_trait;
use cdm_core::services::{BulkAggregator, DeployService, MaterialService, RuntimeParamsValidator};
use cdm_core::simulator::FixtureMaterialService;
use cdm_core::{
    CdMaterialSession, ConfigDiffData, ConsoleConfig, DeployRequest, DeployResponse,
    DeploymentWindow, MaterialListKind, MaterialsPage, OptionalFeatures, PageRequest,
    PipelineTarget, PolicyConsequences, RuntimeParam, RuntimeParamsErrorState, ServerErrors,
    ServiceError, SessionServices, StageType,
};
use cdm_material::{ApprovalRecord, ApprovalRuntimeState, Material};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub use cdm_core::simulator::{
    PathManifestDownloader, RecordingNavigator, RecordingNotifier, StaticConfigDiffService,
    StaticPolicyService, StaticWindowService,
};

/// Wait for a released permit, or fail as aborted once `cancel` fires
async fn hold(gate: &Semaphore, cancel: &CancellationToken) -> Result<(), ServiceError> {
    tokio::select! {
        () = cancel.cancelled() => Err(ServiceError::Aborted),
        permit = gate.acquire() => {
            permit.map_err(|_| ServiceError::Transport("gate closed".into()))?.forget();
            Ok(())
        }
    }
}

/// Yield until `done` holds; panics after many rounds
pub async fn settle(mut done: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}

/// Material service over a fixed listing
#[derive(Debug)]
pub struct ScriptedMaterialService {
    listing: Mutex<MaterialsPage>,
    requests: Mutex<Vec<PageRequest>>,
    failures: Mutex<VecDeque<ServiceError>>,
    gate: Option<Semaphore>,
}

impl ScriptedMaterialService {
    #[must_use]
    pub fn new(listing: MaterialsPage) -> Self {
        Self {
            listing: Mutex::new(listing),
            requests: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            gate: None,
        }
    }

    /// Every request waits for [`Self::release`]
    #[must_use]
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Let `n` held requests complete
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Next request fails with `err`
    pub fn fail_next(&self, err: ServiceError) {
        self.failures.lock().push_back(err);
    }

    /// Replace the listing served from now on
    pub fn set_listing(&self, listing: MaterialsPage) {
        *self.listing.lock() = listing;
    }

    #[must_use]
    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl MaterialService for ScriptedMaterialService {
    async fn fetch_materials(
        &self,
        _kind: MaterialListKind,
        _pipeline_id: u64,
        _stage: StageType,
        page: PageRequest,
        cancel: CancellationToken,
    ) -> Result<MaterialsPage, ServiceError> {
        self.requests.lock().push(page.clone());
        if let Some(gate) = &self.gate {
            hold(gate, &cancel).await?;
        }
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        let listing = self.listing.lock().clone();
        Ok(FixtureMaterialService::slice(&listing, &page))
    }
}

/// Deploy service whose calls wait for an explicit release
#[derive(Debug)]
pub struct GatedDeployService {
    gate: Semaphore,
    error: Mutex<Option<ServiceError>>,
    requests: Mutex<Vec<DeployRequest>>,
    response: DeployResponse,
}

impl Default for GatedDeployService {
    fn default() -> Self {
        Self::new()
    }
}

impl GatedDeployService {
    #[must_use]
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            error: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            response: DeployResponse {
                helm_package_name: Some("chart-1.0.0.tgz".into()),
            },
        }
    }

    /// Calls complete immediately
    #[must_use]
    pub fn open() -> Self {
        let service = Self::new();
        service.gate.add_permits(Semaphore::MAX_PERMITS / 2);
        service
    }

    /// Released calls fail with `err`
    pub fn fail_with(&self, err: ServiceError) {
        *self.error.lock() = Some(err);
    }

    pub fn fail_with_server(&self, errors: ServerErrors) {
        self.fail_with(ServiceError::Server(errors));
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    #[must_use]
    pub fn requests(&self) -> Vec<DeployRequest> {
        self.requests.lock().clone()
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl DeployService for GatedDeployService {
    async fn trigger_deploy(
        &self,
        request: DeployRequest,
        cancel: CancellationToken,
    ) -> Result<DeployResponse, ServiceError> {
        self.requests.lock().push(request);
        hold(&self.gate, &cancel).await?;
        match self.error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(self.response.clone()),
        }
    }
}

/// Parent aggregator recording every published list
#[derive(Debug, Default)]
pub struct RecordingBulkAggregator {
    updates: Mutex<Vec<Vec<Material>>>,
}

impl RecordingBulkAggregator {
    #[must_use]
    pub fn updates(&self) -> Vec<Vec<Material>> {
        self.updates.lock().clone()
    }

    /// Image selected in the last published list
    #[must_use]
    pub fn last_selected_image(&self) -> Option<String> {
        self.updates
            .lock()
            .last()?
            .iter()
            .find(|m| m.is_selected)
            .map(|m| m.image.clone())
    }
}

impl BulkAggregator for RecordingBulkAggregator {
    fn update_materials(&self, materials: &[Material]) {
        self.updates.lock().push(materials.to_vec());
    }
}

/// Flags every required parameter with an empty value
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredParamsValidator;

impl RuntimeParamsValidator for RequiredParamsValidator {
    fn validate(&self, params: &[RuntimeParam]) -> RuntimeParamsErrorState {
        let mut state = RuntimeParamsErrorState::default();
        for param in params.iter().filter(|p| p.required && p.value.trim().is_empty()) {
            state.is_valid = false;
            state
                .cell_errors
                .insert(param.key.clone(), "This is a required field".into());
        }
        state
    }
}

/// `count` plain materials `app:1..=count`
#[must_use]
pub fn materials(count: u64) -> Vec<Material> {
    (1..=count)
        .map(|id| Material::new(id, format!("registry/app:{id}"), (id - 1) as usize))
        .collect()
}

/// Listing of `count` plain materials reporting `total` overall
#[must_use]
pub fn listing(count: u64, total: usize) -> MaterialsPage {
    MaterialsPage::new(materials(count), total)
}

#[must_use]
pub fn approved(id: u64) -> Material {
    Material::new(id, format!("registry/app:{id}"), 0).with_approval(ApprovalRecord::approved())
}

#[must_use]
pub fn unapproved(id: u64) -> Material {
    Material::new(id, format!("registry/app:{id}"), 0)
        .with_approval(ApprovalRecord::with_state(ApprovalRuntimeState::INIT))
}

/// Currently deployed and latest material, pinned first by the server
#[must_use]
pub fn pinned(id: u64) -> Material {
    Material::new(id, format!("registry/app:{id}"), 0).deployed_latest()
}

#[must_use]
pub fn target() -> PipelineTarget {
    PipelineTarget::new(10, 20, 30)
        .with_app_name("web")
        .with_env_name("staging")
}

/// Session plus handles to every fake behind it
pub struct Harness {
    pub session: Arc<CdMaterialSession>,
    pub materials: Arc<ScriptedMaterialService>,
    pub deploy: Arc<GatedDeployService>,
    pub notifier: Arc<RecordingNotifier>,
    pub navigator: Arc<RecordingNavigator>,
    pub bulk: Arc<RecordingBulkAggregator>,
    pub config_diff: Option<Arc<StaticConfigDiffService>>,
}

/// Builder for [`Harness`]
pub struct HarnessBuilder {
    target: PipelineTarget,
    materials: ScriptedMaterialService,
    deploy: GatedDeployService,
    features: OptionalFeatures,
    config: ConsoleConfig,
    config_diff: Option<ConfigDiffData>,
}

impl Harness {
    #[must_use]
    pub fn builder(listing: MaterialsPage) -> HarnessBuilder {
        HarnessBuilder {
            target: target(),
            materials: ScriptedMaterialService::new(listing),
            deploy: GatedDeployService::open(),
            features: OptionalFeatures::none(),
            config: ConsoleConfig::default(),
            config_diff: None,
        }
    }
}

impl HarnessBuilder {
    #[must_use]
    pub fn target(mut self, target: PipelineTarget) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub fn gated_materials(mut self) -> Self {
        self.materials = self.materials.gated();
        self
    }

    #[must_use]
    pub fn gated_deploy(mut self) -> Self {
        self.deploy = GatedDeployService::new();
        self
    }

    #[must_use]
    pub fn window(mut self, window: DeploymentWindow) -> Self {
        self.features = self
            .features
            .with_deployment_window_service(Arc::new(StaticWindowService(window)));
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: PolicyConsequences) -> Self {
        self.features = self
            .features
            .with_policy_consequences(Arc::new(StaticPolicyService(policy)));
        self
    }

    #[must_use]
    pub fn features(mut self, features: impl FnOnce(OptionalFeatures) -> OptionalFeatures) -> Self {
        self.features = features(self.features);
        self
    }

    #[must_use]
    pub fn config_diff(mut self, data: ConfigDiffData) -> Self {
        self.config_diff = Some(data);
        self
    }

    #[must_use]
    pub fn config(mut self, config: ConsoleConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn build(self) -> Harness {
        let materials = Arc::new(self.materials);
        let deploy = Arc::new(self.deploy);
        let notifier = Arc::new(RecordingNotifier::new());
        let navigator = Arc::new(RecordingNavigator::new());
        let bulk = Arc::new(RecordingBulkAggregator::default());
        let config_diff = self.config_diff.map(|d| Arc::new(StaticConfigDiffService::new(d)));

        let mut services = SessionServices::new(
            materials.clone(),
            deploy.clone(),
            notifier.clone(),
            navigator.clone(),
        )
        .with_bulk(bulk.clone());
        if let Some(diff) = &config_diff {
            services = services.with_config_diff(diff.clone());
        }

        let session = Arc::new(CdMaterialSession::new(
            self.target,
            self.config,
            self.features,
            services,
        ));
        Harness {
            session,
            materials,
            deploy,
            notifier,
            navigator,
            bulk,
            config_diff,
        }
    }
}
