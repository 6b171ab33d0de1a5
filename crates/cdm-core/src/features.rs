//! Optional capability set
//!
//! Some collaborators only exist in certain builds or licensing tiers.
//! Each member is nullable and the session branches on presence.

use crate::services::{
    DeploymentWindowService, ManifestDownloader, PolicyConsequenceService, RuntimeParamsValidator,
};
use std::fmt;
use std::sync::Arc;

/// Presence marker for a presentation-only capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub name: String,
}

impl Capability {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Clone, Default)]
pub struct OptionalFeatures {
    /// Approval details on material cards
    pub approval_info_tippy: Option<Capability>,
    /// Deployment window banner above the list
    pub maintenance_window_bar: Option<Capability>,
    /// Promotion source chip on material cards
    pub image_promotion_chip: Option<Capability>,
    pub deployment_window_service: Option<Arc<dyn DeploymentWindowService>>,
    pub manifest_downloader: Option<Arc<dyn ManifestDownloader>>,
    pub runtime_params_validator: Option<Arc<dyn RuntimeParamsValidator>>,
    pub policy_consequences: Option<Arc<dyn PolicyConsequenceService>>,
}

impl OptionalFeatures {
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_approval_info_tippy(mut self) -> Self {
        self.approval_info_tippy = Some(Capability::new("approval-info-tippy"));
        self
    }

    #[inline]
    #[must_use]
    pub fn with_maintenance_window_bar(mut self) -> Self {
        self.maintenance_window_bar = Some(Capability::new("maintenance-window-bar"));
        self
    }

    #[inline]
    #[must_use]
    pub fn with_image_promotion_chip(mut self) -> Self {
        self.image_promotion_chip = Some(Capability::new("image-promotion-chip"));
        self
    }

    #[inline]
    #[must_use]
    pub fn with_deployment_window_service(
        mut self,
        service: Arc<dyn DeploymentWindowService>,
    ) -> Self {
        self.deployment_window_service = Some(service);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_manifest_downloader(mut self, downloader: Arc<dyn ManifestDownloader>) -> Self {
        self.manifest_downloader = Some(downloader);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_runtime_params_validator(
        mut self,
        validator: Arc<dyn RuntimeParamsValidator>,
    ) -> Self {
        self.runtime_params_validator = Some(validator);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_policy_consequences(mut self, service: Arc<dyn PolicyConsequenceService>) -> Self {
        self.policy_consequences = Some(service);
        self
    }
}

impl fmt::Debug for OptionalFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionalFeatures")
            .field("approval_info_tippy", &self.approval_info_tippy.is_some())
            .field("maintenance_window_bar", &self.maintenance_window_bar.is_some())
            .field("image_promotion_chip", &self.image_promotion_chip.is_some())
            .field(
                "deployment_window_service",
                &self.deployment_window_service.is_some(),
            )
            .field("manifest_downloader", &self.manifest_downloader.is_some())
            .field(
                "runtime_params_validator",
                &self.runtime_params_validator.is_some(),
            )
            .field("policy_consequences", &self.policy_consequences.is_some())
            .finish()
    }
}
