//! CDM Material - deployable artifact model
//!
//! Pure, synchronous building blocks of the deployment candidate selector:
//! - [`Material`] and its approval metadata
//! - [`MaterialList`] with the single-selection invariant and page appends
//! - [`partition`] into consumed / eligible sets with a stable eligible count
//! - [`material_cta`] for per-card call-to-action derivation
//! - [`select_by_tag`] for bulk-deploy tag resolution
//!
//! # Example
//!
//! ```rust
//! use cdm_material::{ApprovalRecord, Material, MaterialList, PartitionContext};
//!
//! let mut list = MaterialList::new(vec![
//!     Material::new(1, "registry/app:a1", 0).with_approval(ApprovalRecord::approved()),
//!     Material::new(2, "registry/app:b2", 1),
//! ]);
//! list.select(0).unwrap();
//!
//! let ctx = PartitionContext::default().approval_configured(true);
//! let partition = list.partition(&ctx);
//! assert_eq!(partition.eligible.len(), 1);
//! assert_eq!(partition.consumed.len(), 1);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod approval;
pub mod cta;
pub mod list;
pub mod material;
pub mod partition;
pub mod tag_selection;

pub use approval::{
    is_approval_requester, is_image_approver, ApprovalRecord, ApprovalRuntimeState, ApprovalUser,
    PromotionApprovalRecord, UserApprovalConfig,
};
pub use cta::{can_expire_approval, material_cta, CtaContext, DisabledReason, MaterialCta};
pub use list::{ListError, MaterialList, SelectionChange};
pub use material::{AppliedFilter, FilterState, Material, MaterialInfo, ReleaseTag};
pub use partition::{partition, FilterTabs, FilterView, Partition, PartitionContext};
pub use tag_selection::{select_by_tag, TagSelection, ACTIVE_IMAGE_TAG, LATEST_IMAGE_TAG};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with materials
    pub use crate::{
        material_cta, partition, CtaContext, FilterState, FilterView, Material, MaterialCta,
        MaterialList, Partition, PartitionContext,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
