//! Working list of fetched materials
//!
//! [`MaterialList`] owns every material accumulated across pages and keeps
//! two invariants:
//! - at most one material has `is_selected = true`
//! - `index` fields are contiguous and equal to the list position

use crate::material::Material;
use crate::partition::{partition, Partition, PartitionContext};

/// Errors from list operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListError {
    /// Selection index does not exist in the list
    #[error("material index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Result of a successful selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChange {
    /// Image that was selected before the call, if any
    pub previous_image: Option<String>,
    /// Image selected by the call
    pub image: String,
}

impl SelectionChange {
    /// Whether the selected image identity actually changed
    #[inline]
    #[must_use]
    pub fn image_changed(&self) -> bool {
        self.previous_image.as_deref() != Some(self.image.as_str())
    }
}

/// Ordered materials with a single-selection invariant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialList {
    items: Vec<Material>,
}

impl MaterialList {
    /// Build a list from a freshly fetched first page
    ///
    /// Indices are reassigned to list positions and any extra selections
    /// after the first are cleared.
    #[must_use]
    pub fn new(items: Vec<Material>) -> Self {
        let mut list = Self { items };
        let mut seen_selected = false;
        for (position, mat) in list.items.iter_mut().enumerate() {
            mat.index = position;
            if mat.is_selected {
                if seen_selected {
                    mat.is_selected = false;
                }
                seen_selected = true;
            }
        }
        list
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[Material] {
        &self.items
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Material> {
        self.items.iter()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Material> {
        self.items.get(index)
    }

    /// Select exactly one material, deselecting all others
    ///
    /// # Errors
    /// Returns [`ListError::IndexOutOfRange`] for an unknown index; the
    /// list is left untouched in that case.
    pub fn select(&mut self, index: usize) -> Result<SelectionChange, ListError> {
        if index >= self.items.len() {
            return Err(ListError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }

        let previous_image = self.selected().map(|m| m.image.clone());
        for (position, mat) in self.items.iter_mut().enumerate() {
            mat.is_selected = position == index;
        }

        Ok(SelectionChange {
            previous_image,
            image: self.items[index].image.clone(),
        })
    }

    /// Select by image identity, returning the position when found
    pub fn select_by_image(&mut self, image: &str) -> Option<usize> {
        let position = self.items.iter().position(|m| m.image == image)?;
        for (i, mat) in self.items.iter_mut().enumerate() {
            mat.is_selected = i == position;
        }
        Some(position)
    }

    /// Clear every selection
    pub fn deselect_all(&mut self) {
        for mat in &mut self.items {
            mat.is_selected = false;
        }
    }

    /// First selected material
    #[must_use]
    pub fn selected(&self) -> Option<&Material> {
        self.items.iter().find(|m| m.is_selected)
    }

    /// True iff at least one material passes the resource filters
    #[must_use]
    pub fn are_materials_passing_filters(&self) -> bool {
        self.items.iter().any(|m| m.filter_state.is_allowed())
    }

    /// True when the deployed+latest image is pinned in the list
    #[must_use]
    pub fn has_consumed_pin(&self) -> bool {
        self.items.iter().any(Material::is_consumed_pin)
    }

    /// Offset for the next "load older" request
    ///
    /// The pinned deployed+latest image is not part of the server's
    /// regular ordering, so it does not count towards the offset.
    #[must_use]
    pub fn older_page_offset(&self) -> usize {
        self.items.len() - usize::from(self.has_consumed_pin())
    }

    /// Append an older page, returning the materials actually added
    ///
    /// Deployed+latest entries are dropped since the first page already
    /// carries them; appended entries are never selected and are reindexed
    /// to follow the existing list.
    pub fn append_older(&mut self, page: Vec<Material>) -> &[Material] {
        let start = self.items.len();
        let appended = page
            .into_iter()
            .filter(|m| !m.is_consumed_pin())
            .enumerate()
            .map(|(offset, mut m)| {
                m.index = start + offset;
                m.is_selected = false;
                m
            });
        self.items.extend(appended);
        &self.items[start..]
    }

    /// Partition into consumed/eligible sets, force-deselecting unapproved
    /// materials when approval is configured
    pub fn partition(&mut self, ctx: &PartitionContext) -> Partition<'_> {
        partition(&mut self.items, ctx)
    }

    /// Consume into the underlying vector
    #[inline]
    #[must_use]
    pub fn into_vec(self) -> Vec<Material> {
        self.items
    }
}

impl<'a> IntoIterator for &'a MaterialList {
    type Item = &'a Material;
    type IntoIter = std::slice::Iter<'a, Material>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::FilterState;
    use proptest::prelude::*;

    fn list_of(n: usize) -> MaterialList {
        MaterialList::new(
            (0..n)
                .map(|i| Material::new(i as u64 + 1, format!("img:{i}"), 0))
                .collect(),
        )
    }

    #[test]
    fn new_reindexes_and_keeps_first_selection() {
        let mut a = Material::new(1, "a", 9);
        a.is_selected = true;
        let mut b = Material::new(2, "b", 3);
        b.is_selected = true;

        let list = MaterialList::new(vec![a, b]);
        assert_eq!(list.get(0).unwrap().index, 0);
        assert_eq!(list.get(1).unwrap().index, 1);
        assert_eq!(list.selected().unwrap().image, "a");
        assert!(!list.get(1).unwrap().is_selected);
    }

    #[test]
    fn select_reports_identity_change() {
        let mut list = list_of(3);
        let first = list.select(1).unwrap();
        assert!(first.image_changed());

        let again = list.select(1).unwrap();
        assert!(!again.image_changed());

        let other = list.select(2).unwrap();
        assert_eq!(other.previous_image.as_deref(), Some("img:1"));
    }

    #[test]
    fn select_out_of_range_leaves_list_untouched() {
        let mut list = list_of(2);
        list.select(0).unwrap();
        let err = list.select(5).unwrap_err();
        assert_eq!(err, ListError::IndexOutOfRange { index: 5, len: 2 });
        assert_eq!(list.selected().unwrap().index, 0);
    }

    #[test]
    fn offset_discounts_pinned_image() {
        let mut items: Vec<_> = (0..20)
            .map(|i| Material::new(i, format!("img:{i}"), 0))
            .collect();
        assert_eq!(MaterialList::new(items.clone()).older_page_offset(), 20);

        items[0] = items[0].clone().deployed_latest();
        assert_eq!(MaterialList::new(items).older_page_offset(), 19);
    }

    #[test]
    fn append_drops_pinned_duplicate_and_reindexes() {
        let mut list = MaterialList::new(vec![
            Material::new(1, "deployed", 0).deployed_latest(),
            Material::new(2, "b", 0),
        ]);
        let page = vec![
            Material::new(1, "deployed", 0).deployed_latest(),
            Material::new(3, "c", 0),
            Material::new(4, "d", 0),
        ];

        let appended: Vec<_> = list.append_older(page).iter().map(|m| m.index).collect();
        assert_eq!(appended, vec![2, 3]);
        assert_eq!(list.len(), 4);
        assert_eq!(list.iter().filter(|m| m.image == "deployed").count(), 1);
    }

    #[test]
    fn passing_filters_needs_one_allowed() {
        let list = MaterialList::new(vec![
            Material::new(1, "a", 0).with_filter_state(FilterState::Blocked),
            Material::new(2, "b", 0).with_filter_state(FilterState::Error),
        ]);
        assert!(!list.are_materials_passing_filters());

        let list = MaterialList::new(vec![
            Material::new(1, "a", 0).with_filter_state(FilterState::Blocked),
            Material::new(2, "b", 0),
        ]);
        assert!(list.are_materials_passing_filters());
    }

    proptest! {
        #[test]
        fn prop_at_most_one_selected(
            len in 1usize..30,
            picks in proptest::collection::vec(0usize..40, 0..50),
        ) {
            let mut list = list_of(len);
            for pick in picks {
                let _ = list.select(pick);
                let selected = list.iter().filter(|m| m.is_selected).count();
                prop_assert!(selected <= 1);
            }
        }

        #[test]
        fn prop_append_keeps_indices_contiguous(
            first in 0usize..20,
            second in 0usize..20,
            pinned in any::<bool>(),
        ) {
            let mut items: Vec<_> = (0..first)
                .map(|i| Material::new(i as u64, format!("a{i}"), 0))
                .collect();
            if pinned && !items.is_empty() {
                items[0] = items[0].clone().deployed_latest();
            }
            let mut list = MaterialList::new(items);
            let mut page: Vec<_> = (0..second)
                .map(|i| Material::new(100 + i as u64, format!("b{i}"), 0))
                .collect();
            if pinned {
                page.push(Material::new(0, "a0", 0).deployed_latest());
            }
            list.append_older(page);

            for (position, mat) in list.iter().enumerate() {
                prop_assert_eq!(mat.index, position);
            }
            prop_assert!(list.iter().filter(|m| m.is_consumed_pin()).count() <= 1);
        }
    }
}
