//! Selection reconciler
//!
//! Owns the single-selection rules on top of [`MaterialList`]:
//! - selection respects the per-card CTA (only SELECT cards are clickable)
//! - constrained trigger modes skip config tracking when the image is unchanged
//! - bulk hand-offs are resolved by image identity, falling back to a search

use crate::error::SessionError;
use cdm_material::{material_cta, CtaContext, Material, MaterialList};
use tracing::debug;

/// Bulk-selection sentinel meaning "deselect everything"
pub const SELECT_NONE: &str = "SELECT_NONE";

/// Selection requested by a parent bulk flow
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BulkHandoff {
    SelectNone,
    Image(String),
}

impl BulkHandoff {
    /// Parse the wire value used by the bulk flow
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        if value == SELECT_NONE {
            Self::SelectNone
        } else {
            Self::Image(value.to_string())
        }
    }
}

/// What applying a hand-off did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffOutcome {
    Selected(usize),
    Cleared,
    /// Image not in the loaded page; search for it
    NeedsSearch(String),
}

/// Apply a bulk hand-off to freshly loaded materials
pub fn apply_handoff(list: &mut MaterialList, handoff: &BulkHandoff) -> HandoffOutcome {
    match handoff {
        BulkHandoff::SelectNone => {
            list.deselect_all();
            HandoffOutcome::Cleared
        }
        BulkHandoff::Image(image) => match list.select_by_image(image) {
            Some(index) => HandoffOutcome::Selected(index),
            None => {
                debug!(image = %image, "bulk selection not in page, searching");
                HandoffOutcome::NeedsSearch(image.clone())
            }
        },
    }
}

/// Result of a user selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOutcome {
    pub index: usize,
    pub image: String,
    /// Config-diff tracking must follow the new selection
    pub track_config: bool,
}

/// Select `index` if its CTA allows it
///
/// # Errors
/// [`SessionError::List`] for unknown indices and
/// [`SessionError::NotSelectable`] for excluded, vulnerable or disabled cards.
pub fn select(
    list: &mut MaterialList,
    index: usize,
    cta: &CtaContext,
    constrained_mode: bool,
) -> Result<SelectOutcome, SessionError> {
    let mat = list.get(index).ok_or(cdm_material::ListError::IndexOutOfRange {
        index,
        len: list.len(),
    })?;
    if !material_cta(mat, cta).is_interactive() {
        return Err(SessionError::NotSelectable { index });
    }

    let change = list.select(index)?;
    let track_config = !constrained_mode || change.image_changed();
    Ok(SelectOutcome {
        index,
        image: change.image,
        track_config,
    })
}

/// Projections re-derived after every list mutation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Derived<'a> {
    pub selected: Option<&'a Material>,
    pub are_materials_passing_filters: bool,
}

#[must_use]
pub fn derive(list: &MaterialList) -> Derived<'_> {
    Derived {
        selected: list.selected(),
        are_materials_passing_filters: list.are_materials_passing_filters(),
    }
}
