//! Approval and resource-filter partitioning
//!
//! Splits a material list into:
//! - `consumed`: materials without a current approval (approval-gated only)
//! - `approved`: everything else, before any view narrowing
//! - `eligible`: `approved`, narrowed to ALLOWED materials when the
//!   eligible-only view is active, no search is applied and resource
//!   filters exist
//!
//! Search and the eligible/all toggle never narrow together; an applied
//! search always disables the view narrowing.

use crate::material::Material;
use serde::{Deserialize, Serialize};

/// Active filter tab
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterView {
    #[default]
    Eligible,
    All,
}

/// Inputs that drive partitioning besides the list itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionContext {
    /// Pipeline requires user approval before deploy
    pub approval_configured: bool,
    /// User is exempt from the approval policy
    pub exception_user: bool,
    pub filter_view: FilterView,
    pub search_applied: bool,
    /// At least one resource filter is configured for the pipeline
    pub resource_filters_present: bool,
}

impl PartitionContext {
    #[inline]
    #[must_use]
    pub fn approval_configured(mut self, configured: bool) -> Self {
        self.approval_configured = configured;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_exception_user(mut self, exception_user: bool) -> Self {
        self.exception_user = exception_user;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_view(mut self, view: FilterView) -> Self {
        self.filter_view = view;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_search(mut self, applied: bool) -> Self {
        self.search_applied = applied;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_resource_filters(mut self, present: bool) -> Self {
        self.resource_filters_present = present;
        self
    }

    /// Whether the approval split applies
    #[inline]
    #[must_use]
    pub fn approval_split(&self) -> bool {
        self.approval_configured && !self.exception_user
    }

    /// Whether `eligible` is narrowed to ALLOWED materials
    #[inline]
    #[must_use]
    pub fn narrows_to_allowed(&self) -> bool {
        !self.search_applied
            && self.resource_filters_present
            && self.filter_view == FilterView::Eligible
    }
}

/// Partition of a material list, borrowing from it
#[derive(Debug, Clone, PartialEq)]
pub struct Partition<'a> {
    pub consumed: Vec<&'a Material>,
    /// Approved materials before view narrowing
    pub approved: Vec<&'a Material>,
    /// Materials visible in the current view
    pub eligible: Vec<&'a Material>,
    /// ALLOWED materials among `approved`; independent of the active view
    pub eligible_count: usize,
}

impl Partition<'_> {
    /// Materials shown in the "latest" tab (everything not consumed)
    #[inline]
    #[must_use]
    pub fn total_non_consumed(&self) -> usize {
        self.approved.len()
    }

    /// Labels for the eligible/all filter tabs
    #[must_use]
    pub fn filter_tabs(&self) -> FilterTabs {
        FilterTabs {
            eligible: format!(
                "Eligible images {}/{}",
                self.eligible_count,
                self.total_non_consumed()
            ),
            all: format!("Latest {} images", self.total_non_consumed()),
        }
    }
}

/// Filter action bar labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterTabs {
    pub eligible: String,
    pub all: String,
}

/// Partition `materials` for the given context
///
/// When the approval split applies, every unapproved material is
/// force-deselected before the partition is taken.
pub fn partition<'a>(materials: &'a mut [Material], ctx: &PartitionContext) -> Partition<'a> {
    let split = ctx.approval_split();

    if split {
        for mat in materials.iter_mut() {
            if !is_approved(mat) {
                mat.is_selected = false;
            }
        }
    }

    let materials: &'a [Material] = materials;
    let (consumed, approved): (Vec<&Material>, Vec<&Material>) = if split {
        materials.iter().partition(|m| !is_approved(m))
    } else {
        (Vec::new(), materials.iter().collect())
    };

    let eligible_count = approved
        .iter()
        .filter(|m| m.filter_state.is_allowed())
        .count();

    let eligible = if ctx.narrows_to_allowed() {
        approved
            .iter()
            .copied()
            .filter(|m| m.filter_state.is_allowed())
            .collect()
    } else {
        approved.clone()
    };

    Partition {
        consumed,
        approved,
        eligible,
        eligible_count,
    }
}

fn is_approved(mat: &Material) -> bool {
    mat.user_approval_metadata
        .as_ref()
        .is_some_and(|r| r.approval_runtime_state.is_approved())
}
