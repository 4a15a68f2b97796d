//! In-memory view of the category hierarchy.

use std::collections::{HashMap, HashSet};

use common::CategoryId;

use super::Category;

/// A category together with its active subcategories, nested recursively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryNode {
    pub category: Category,
    pub sub_categories: Vec<CategoryNode>,
}

/// Parent/child index over every visible category.
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    by_id: HashMap<CategoryId, Category>,
    children: HashMap<CategoryId, Vec<CategoryId>>,
}

impl CategoryTree {
    pub fn new(categories: Vec<Category>) -> Self {
        let mut children: HashMap<CategoryId, Vec<CategoryId>> = HashMap::new();
        for category in &categories {
            if let Some(parent_id) = category.parent_id {
                children.entry(parent_id).or_default().push(category.id);
            }
        }
        let by_id: HashMap<_, _> = categories.into_iter().map(|c| (c.id, c)).collect();
        for ids in children.values_mut() {
            ids.sort_by(|a, b| by_id[a].name.cmp(&by_id[b].name));
        }
        Self { by_id, children }
    }

    pub fn get(&self, id: CategoryId) -> Option<&Category> {
        self.by_id.get(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Top-level categories ordered by name, optionally filtered by `active`.
    pub fn roots(&self, active: Option<bool>) -> Vec<&Category> {
        let mut roots: Vec<_> = self
            .by_id
            .values()
            .filter(|c| c.parent_id.is_none())
            .filter(|c| active.is_none_or(|a| c.active == a))
            .collect();
        roots.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        roots
    }

    /// Builds the nested view of one category. Only active children are
    /// included below the requested node.
    pub fn node(&self, id: CategoryId) -> Option<CategoryNode> {
        let mut seen = HashSet::new();
        self.node_inner(id, &mut seen)
    }

    fn node_inner(&self, id: CategoryId, seen: &mut HashSet<CategoryId>) -> Option<CategoryNode> {
        if !seen.insert(id) {
            return None;
        }
        let category = self.by_id.get(&id)?.clone();
        let sub_categories = self
            .child_ids(id)
            .iter()
            .filter(|child| self.by_id[*child].active)
            .filter_map(|child| self.node_inner(*child, seen))
            .collect();
        Some(CategoryNode {
            category,
            sub_categories,
        })
    }

    fn child_ids(&self, id: CategoryId) -> &[CategoryId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every category below `id`, active or not, depth first.
    pub fn descendants(&self, id: CategoryId) -> Vec<CategoryId> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut stack: Vec<CategoryId> = self.child_ids(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            out.push(next);
            stack.extend(self.child_ids(next).iter().rev().copied());
        }
        out
    }

    /// Parents of `id` from nearest to the root.
    pub fn ancestors(&self, id: CategoryId) -> Vec<CategoryId> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = self.by_id.get(&id).and_then(|c| c.parent_id);
        while let Some(parent_id) = current {
            if !seen.insert(parent_id) {
                break;
            }
            out.push(parent_id);
            current = self.by_id.get(&parent_id).and_then(|c| c.parent_id);
        }
        out
    }

    pub fn depth(&self, id: CategoryId) -> usize {
        self.ancestors(id).len()
    }

    /// True when re-parenting `id` under `new_parent` would form a loop.
    pub fn would_create_cycle(&self, id: CategoryId, new_parent: CategoryId) -> bool {
        new_parent == id || self.ancestors(new_parent).contains(&id)
    }
}
