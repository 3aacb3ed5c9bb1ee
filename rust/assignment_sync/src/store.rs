//! Assignment store: catalog, assigned-id set and derived views for one
//! parent entity.
//!
//! The store is synchronous and owns no I/O. Derived views are memoized on
//! their declared inputs:
//!
//! | View | Inputs |
//! |------|--------|
//! | filtered | search term, category selector, catalog version |
//! | grouped | same as filtered |
//! | assigned items | assigned-set version, catalog version |
//!
//! Assigned-set changes never invalidate the filtered or grouped views.

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};

use crate::filter::SearchFilter;
use crate::memo::Memo;
use crate::types::{AssignableItem, CategorySummary, ItemGroup};

/// (effective search term, category selector, catalog version)
type ViewKey = (String, Option<String>, u64);

#[derive(Debug, Default)]
pub struct AssignmentStore {
    parent_id: Option<String>,
    catalog: Vec<AssignableItem>,
    catalog_version: u64,
    catalog_error: Option<String>,
    assigned: AHashSet<String>,
    assigned_version: u64,
    /// Items supplied by the collaborator, used to resolve assigned ids the
    /// catalog does not (yet) contain.
    seeded: AHashMap<String, AssignableItem>,
    search_term: String,
    category: Option<String>,
    filtered: Memo<ViewKey, Arc<[AssignableItem]>>,
    grouped: Memo<ViewKey, Arc<[ItemGroup]>>,
    resolved: Memo<(u64, u64), Arc<[AssignableItem]>>,
}

impl AssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the store to a parent entity and seed the assigned set.
    pub fn initialize(&mut self, parent_id: &str, assigned: &[AssignableItem]) {
        self.parent_id = Some(parent_id.to_string());
        self.replace_assigned(assigned);
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    pub fn set_catalog(&mut self, items: Vec<AssignableItem>) {
        self.catalog = items;
        self.catalog_error = None;
        self.catalog_version += 1;
    }

    /// Record a catalog load failure. The catalog is left empty.
    pub fn set_catalog_error(&mut self, message: impl Into<String>) {
        self.catalog.clear();
        self.catalog_error = Some(message.into());
        self.catalog_version += 1;
    }

    pub fn catalog(&self) -> &[AssignableItem] {
        &self.catalog
    }

    pub fn catalog_error(&self) -> Option<&str> {
        self.catalog_error.as_deref()
    }

    pub fn find(&self, id: &str) -> Option<&AssignableItem> {
        self.catalog
            .iter()
            .find(|item| item.id == id)
            .or_else(|| self.seeded.get(id))
    }

    /// Sorted distinct categories present in the catalog.
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .catalog
            .iter()
            .filter_map(|item| item.category.clone())
            .collect::<AHashSet<_>>()
            .into_iter()
            .collect();
        categories.sort();
        categories
    }

    // =========================================================================
    // Assigned set
    // =========================================================================

    pub fn is_assigned(&self, id: &str) -> bool {
        self.assigned.contains(id)
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }

    pub fn total_count(&self) -> usize {
        self.catalog.len()
    }

    pub fn assigned_version(&self) -> u64 {
        self.assigned_version
    }

    pub fn sorted_assigned_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.assigned.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Replace the assigned set with a new collaborator snapshot, but only
    /// if its sorted id sequence differs. Returns whether anything changed.
    pub fn resync(&mut self, snapshot: &[AssignableItem]) -> bool {
        let mut incoming: Vec<&str> = snapshot.iter().map(|item| item.id.as_str()).collect();
        incoming.sort_unstable();
        incoming.dedup();

        let mut current: Vec<&str> = self.assigned.iter().map(String::as_str).collect();
        current.sort_unstable();

        if incoming == current {
            return false;
        }
        self.replace_assigned(snapshot);
        true
    }

    fn replace_assigned(&mut self, snapshot: &[AssignableItem]) {
        self.assigned = snapshot.iter().map(|item| item.id.clone()).collect();
        self.seeded = snapshot
            .iter()
            .map(|item| (item.id.clone(), item.clone()))
            .collect();
        self.assigned_version += 1;
    }

    /// Add ids to the assigned set. Returns whether the set changed.
    pub fn mark_assigned<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> bool {
        let mut changed = false;
        for id in ids {
            changed |= self.assigned.insert(id.to_string());
        }
        if changed {
            self.assigned_version += 1;
        }
        changed
    }

    /// Remove ids from the assigned set. Returns whether the set changed.
    pub fn mark_unassigned<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> bool {
        let mut changed = false;
        for id in ids {
            changed |= self.assigned.remove(id);
        }
        if changed {
            self.assigned_version += 1;
        }
        changed
    }

    /// Ids of all catalog items in `category` whose membership equals
    /// `assigned`. Uses the full catalog, never the filtered view.
    pub fn ids_in_category(&self, category: &str, assigned: bool) -> Vec<String> {
        self.catalog
            .iter()
            .filter(|item| item.category.as_deref() == Some(category))
            .filter(|item| self.assigned.contains(&item.id) == assigned)
            .map(|item| item.id.clone())
            .collect()
    }

    pub fn category_summary(&self, category: &str) -> CategorySummary {
        self.catalog
            .iter()
            .filter(|item| item.category.as_deref() == Some(category))
            .fold(CategorySummary::default(), |mut summary, item| {
                summary.total += 1;
                if self.assigned.contains(&item.id) {
                    summary.assigned += 1;
                }
                summary
            })
    }

    // =========================================================================
    // Filter inputs and derived views
    // =========================================================================

    /// Set the already-gated effective search term.
    pub fn set_search_term(&mut self, effective_term: &str) {
        self.search_term = effective_term.to_string();
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn set_category(&mut self, category: Option<&str>) {
        self.category = category.map(str::to_string);
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    fn view_key(&self) -> ViewKey {
        (
            self.search_term.clone(),
            self.category.clone(),
            self.catalog_version,
        )
    }

    pub fn filtered_items(&mut self) -> Arc<[AssignableItem]> {
        let key = self.view_key();
        let catalog = &self.catalog;
        let (term, category, _) = &key;
        let filter = SearchFilter::new(category.as_deref(), term);
        self.filtered
            .get_or_compute(key.clone(), || {
                if filter.is_unfiltered() {
                    return catalog.as_slice().into();
                }
                catalog
                    .iter()
                    .filter(|item| filter.matches(item))
                    .cloned()
                    .collect()
            })
            .clone()
    }

    /// Filtered items partitioned by category, groups ordered by category
    /// (uncategorized first) and items ordered by name, then id.
    pub fn grouped_items(&mut self) -> Arc<[ItemGroup]> {
        let key = self.view_key();
        if let Some(groups) = self.grouped.get(&key) {
            return groups.clone();
        }
        let filtered = self.filtered_items();
        self.grouped
            .get_or_compute(key, || group_items(&filtered))
            .clone()
    }

    /// Resolved items for the assigned set: catalog order first, then seeded
    /// items missing from the catalog, by id.
    pub fn assigned_items(&mut self) -> Arc<[AssignableItem]> {
        let key = (self.assigned_version, self.catalog_version);
        let catalog = &self.catalog;
        let assigned = &self.assigned;
        let seeded = &self.seeded;
        self.resolved
            .get_or_compute(key, || {
                let mut items: Vec<AssignableItem> = catalog
                    .iter()
                    .filter(|item| assigned.contains(&item.id))
                    .cloned()
                    .collect();
                let in_catalog: AHashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
                let mut missing: Vec<&AssignableItem> = seeded
                    .values()
                    .filter(|item| assigned.contains(&item.id) && !in_catalog.contains(item.id.as_str()))
                    .collect();
                missing.sort_by(|a, b| a.id.cmp(&b.id));
                items.extend(missing.into_iter().cloned());
                items.into()
            })
            .clone()
    }

    /// Recomputation counters: (filtered, grouped, assigned items).
    pub fn view_computations(&self) -> (u64, u64, u64) {
        (
            self.filtered.computations(),
            self.grouped.computations(),
            self.resolved.computations(),
        )
    }
}

fn group_items(items: &[AssignableItem]) -> Arc<[ItemGroup]> {
    let mut groups: BTreeMap<Option<String>, Vec<AssignableItem>> = BTreeMap::new();
    for item in items {
        groups
            .entry(item.category.clone())
            .or_default()
            .push(item.clone());
    }
    groups
        .into_iter()
        .map(|(category, mut items)| {
            items.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
            ItemGroup { category, items }
        })
        .collect()
}
