//! CDM Core - deployment candidate selection session
//!
//! Orchestrates one open trigger view on top of [`cdm_material`]:
//! - [`fetcher`]: first page and "load older" with independent cancellation
//! - [`reconciler`]: single selection, bulk hand-offs, derived projections
//! - [`trigger`]: the deploy state machine with at-most-once dispatch
//! - [`session`]: the [`CdMaterialSession`] tying them together
//!
//! Collaborators (material listing, deploy, notifier, routing, ...) are
//! injected as trait objects from [`services`]; optional ones live in
//! [`OptionalFeatures`].

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cancel;
pub mod config;
pub mod config_diff;
pub mod error;
pub mod features;
pub mod fetcher;
pub mod notify;
pub mod presentation;
pub mod query;
pub mod reconciler;
pub mod services;
pub mod session;
pub mod simulator;
pub mod trigger;
pub mod types;

pub use cancel::{run_cancellable, CancelScope};
pub use config::ConsoleConfig;
pub use config_diff::{
    ConfigDiffData, ConfigDiffKey, ConfigDiffSnapshot, DeploymentConfig, PreviousDeployment,
};
pub use error::{
    ConfigError, ErrorKind, FetchError, MissingIds, ServerErrorItem, ServerErrors, ServiceError,
    SessionError, TriggerError,
};
pub use features::{Capability, OptionalFeatures};
pub use fetcher::{Companions, FetchParams, InitialLoad, MaterialFetcher, OlderPage};
pub use notify::{Toast, ToastAction, ToastVariant};
pub use presentation::{ButtonStyle, DeployButton, EmptyState, MaterialCard};
pub use query::{TriggerQuery, ViewMode};
pub use reconciler::{BulkHandoff, HandoffOutcome, SelectOutcome, SELECT_NONE};
pub use services::{
    BulkAggregator, ConfigDiffService, DeployService, DeploymentWindowService, ManifestDownloader,
    MaterialService, Navigator, Notifier, PolicyConsequenceService, RuntimeParamsValidator,
};
pub use session::{CdMaterialSession, LoadStatus, PartitionSummary, SessionServices};
pub use simulator::{run_simulation, Fixture, SimulationConfig, SimulationReport};
pub use trigger::{TriggerController, TriggerOutcome, TriggerPhase};
pub use types::*;

/// Prelude module for common imports
pub mod prelude {
    //! Session types most callers need
    pub use crate::{
        BulkHandoff, CdMaterialSession, ConsoleConfig, OptionalFeatures, PipelineTarget,
        SessionError, SessionServices, TriggerOutcome, TriggerPhase,
    };
    pub use cdm_material::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
