//! Immutable three-level category taxonomy
//!
//! The tree is loaded once into an arena: all nodes live in a single vector,
//! parent/child links are integer indices, and id/token lookups are built at
//! load time. After construction the taxonomy is read-only and safe to share
//! across concurrent readers without locking.
//!
//! Only level-3 (leaf) categories are valid targets for market analysis;
//! every search and suggestion API returns level-3 nodes exclusively.

mod dataset;

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::PipelineError;

/// Maximum number of suggestions returned per product name.
const SUGGESTION_LIMIT: usize = 10;

/// One raw taxonomy entry, as supplied by the dataset.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: u32,
    pub name: String,
    /// 1 (root), 2, or 3 (leaf).
    pub level: u8,
    pub parent_id: Option<u32>,
    pub aliases: Vec<String>,
}

/// A node in the arena. Parent is an arena index, not an id.
#[derive(Debug, Clone)]
struct CatalogNode {
    id: u32,
    name: String,
    level: u8,
    parent: Option<usize>,
    aliases: Vec<String>,
    /// Lowercased tokens from the name plus all aliases, built once.
    tokens: HashSet<String>,
}

/// A search or suggestion result. `is_valid_for_analysis` is always true for
/// hits returned by the level-3 APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryHit {
    pub id: u32,
    pub name: String,
    pub level: u8,
    pub is_valid_for_analysis: bool,
}

/// Outcome of validating a category id for analysis use.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryValidation {
    pub is_valid: bool,
    /// None when the id is unknown.
    pub level: Option<u8>,
    pub message: String,
    /// Level-3 descendants when the id names a level-1 or level-2 category.
    pub suggestions: Vec<CategoryHit>,
}

/// Result of [`CatalogTaxonomy::smart_search`]: three disjoint, level-3-only
/// buckets.
#[derive(Debug, Clone, Serialize)]
pub struct SmartSearchResult {
    /// Nodes whose normalized name equals the query.
    pub exact: Vec<CategoryHit>,
    /// Fuzzy and partial matches, excluding the exact hits.
    pub suggestions: Vec<CategoryHit>,
    /// The fixed high-traffic set, minus anything the query already surfaced.
    pub popular: Vec<CategoryHit>,
}

/// The immutable category tree.
#[derive(Debug)]
pub struct CatalogTaxonomy {
    nodes: Vec<CatalogNode>,
    by_id: HashMap<u32, usize>,
    children: Vec<Vec<usize>>,
    popular: Vec<u32>,
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl CatalogTaxonomy {
    /// Builds the taxonomy from the built-in dataset.
    pub fn builtin() -> Self {
        Self::from_entries(
            dataset::builtin_entries(),
            dataset::POPULAR_CATEGORY_IDS.to_vec(),
        )
        .expect("built-in dataset must be well-formed")
    }

    /// Builds a taxonomy from raw entries. Entries must be ordered so that
    /// parents precede children; ids must be unique, levels in 1..=3, and
    /// each child exactly one level below its parent.
    pub fn from_entries(
        entries: Vec<CatalogEntry>,
        popular: Vec<u32>,
    ) -> Result<Self, PipelineError> {
        let mut nodes: Vec<CatalogNode> = Vec::with_capacity(entries.len());
        let mut by_id: HashMap<u32, usize> = HashMap::with_capacity(entries.len());

        for entry in entries {
            if by_id.contains_key(&entry.id) {
                return Err(PipelineError::configuration(format!(
                    "duplicate category id {}",
                    entry.id
                )));
            }
            if !(1..=3).contains(&entry.level) {
                return Err(PipelineError::configuration(format!(
                    "category {} has invalid level {}",
                    entry.id, entry.level
                )));
            }
            let parent = match entry.parent_id {
                None => {
                    if entry.level != 1 {
                        return Err(PipelineError::configuration(format!(
                            "category {} has level {} but no parent",
                            entry.id, entry.level
                        )));
                    }
                    None
                }
                Some(parent_id) => {
                    let idx = *by_id.get(&parent_id).ok_or_else(|| {
                        PipelineError::configuration(format!(
                            "category {} references unknown parent {}",
                            entry.id, parent_id
                        ))
                    })?;
                    if nodes[idx].level + 1 != entry.level {
                        return Err(PipelineError::configuration(format!(
                            "category {} at level {} cannot be a child of level {}",
                            entry.id, entry.level, nodes[idx].level
                        )));
                    }
                    Some(idx)
                }
            };

            let mut tokens: HashSet<String> = tokenize(&entry.name).into_iter().collect();
            for alias in &entry.aliases {
                tokens.extend(tokenize(alias));
            }

            by_id.insert(entry.id, nodes.len());
            nodes.push(CatalogNode {
                id: entry.id,
                name: entry.name,
                level: entry.level,
                parent,
                aliases: entry.aliases.iter().map(|a| normalize(a)).collect(),
                tokens,
            });
        }

        let mut children = vec![Vec::new(); nodes.len()];
        for (idx, node) in nodes.iter().enumerate() {
            if let Some(parent) = node.parent {
                children[parent].push(idx);
            }
        }

        Ok(Self {
            nodes,
            by_id,
            children,
            popular,
        })
    }

    fn hit(&self, idx: usize) -> CategoryHit {
        let node = &self.nodes[idx];
        CategoryHit {
            id: node.id,
            name: node.name.clone(),
            level: node.level,
            is_valid_for_analysis: node.level == 3,
        }
    }

    fn level3_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.level == 3)
            .map(|(idx, _)| idx)
    }

    /// Number of query tokens present in the node's token set.
    fn overlap_score(&self, idx: usize, query_tokens: &[String]) -> usize {
        let node = &self.nodes[idx];
        query_tokens
            .iter()
            .filter(|t| node.tokens.contains(*t))
            .count()
    }

    /// Substring match of `term` against the node's name or aliases.
    fn matches_term(&self, idx: usize, term: &str) -> bool {
        let node = &self.nodes[idx];
        normalize(&node.name).contains(term) || node.aliases.iter().any(|a| a.contains(term))
    }

    /// All level-3 categories whose name or alias set contains `term`,
    /// case-insensitive.
    pub fn find_level3_categories(&self, term: &str) -> Vec<CategoryHit> {
        let term = normalize(term);
        if term.is_empty() {
            return Vec::new();
        }
        self.level3_indices()
            .filter(|&idx| self.matches_term(idx, &term))
            .map(|idx| self.hit(idx))
            .collect()
    }

    /// Scores every level-3 category by token overlap against the product
    /// name and returns the top matches, ties broken by ascending id.
    pub fn suggest_level3_for_product(&self, product_name: &str) -> Vec<CategoryHit> {
        let query_tokens = tokenize(product_name);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, usize)> = self
            .level3_indices()
            .map(|idx| (idx, self.overlap_score(idx, &query_tokens)))
            .filter(|(_, score)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(self.nodes[a.0].id.cmp(&self.nodes[b.0].id)));
        scored
            .into_iter()
            .take(SUGGESTION_LIMIT)
            .map(|(idx, _)| self.hit(idx))
            .collect()
    }

    /// Checks whether `id` names a leaf category usable for analysis. For
    /// level-1 and level-2 ids the result carries level-3 descendants as
    /// suggestions; unknown ids get an empty suggestion list.
    pub fn validate_category(&self, id: u32) -> CategoryValidation {
        let Some(&idx) = self.by_id.get(&id) else {
            return CategoryValidation {
                is_valid: false,
                level: None,
                message: format!("unknown category id {id}"),
                suggestions: Vec::new(),
            };
        };

        let node = &self.nodes[idx];
        if node.level == 3 {
            return CategoryValidation {
                is_valid: true,
                level: Some(3),
                message: format!("category '{}' is valid for analysis", node.name),
                suggestions: Vec::new(),
            };
        }

        CategoryValidation {
            is_valid: false,
            level: Some(node.level),
            message: format!(
                "category '{}' is level {}; analysis requires a level-3 category",
                node.name, node.level
            ),
            suggestions: self
                .level3_descendants(idx)
                .into_iter()
                .map(|idx| self.hit(idx))
                .collect(),
        }
    }

    fn level3_descendants(&self, idx: usize) -> Vec<usize> {
        let mut found = Vec::new();
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            for &child in &self.children[current] {
                if self.nodes[child].level == 3 {
                    found.push(child);
                } else {
                    stack.push(child);
                }
            }
        }
        found.sort_by_key(|&idx| self.nodes[idx].id);
        found
    }

    /// Combined search: exact name matches, fuzzy suggestions, and the fixed
    /// high-traffic set, all level-3 and mutually disjoint.
    pub fn smart_search(&self, query: &str) -> SmartSearchResult {
        let normalized = normalize(query);
        let query_tokens = tokenize(query);

        let exact: Vec<usize> = self
            .level3_indices()
            .filter(|&idx| normalize(&self.nodes[idx].name) == normalized)
            .collect();

        let mut seen: HashSet<usize> = exact.iter().copied().collect();
        let mut suggestions: Vec<(usize, usize)> = Vec::new();
        if !normalized.is_empty() {
            for idx in self.level3_indices() {
                if seen.contains(&idx) {
                    continue;
                }
                let score = self.overlap_score(idx, &query_tokens);
                if score > 0 || self.matches_term(idx, &normalized) {
                    suggestions.push((idx, score));
                }
            }
        }
        suggestions
            .sort_by(|a, b| b.1.cmp(&a.1).then(self.nodes[a.0].id.cmp(&self.nodes[b.0].id)));
        seen.extend(suggestions.iter().map(|(idx, _)| *idx));

        let popular: Vec<usize> = self
            .popular
            .iter()
            .filter_map(|id| self.by_id.get(id).copied())
            .filter(|idx| self.nodes[*idx].level == 3 && !seen.contains(idx))
            .collect();

        SmartSearchResult {
            exact: exact.into_iter().map(|idx| self.hit(idx)).collect(),
            suggestions: suggestions
                .into_iter()
                .map(|(idx, _)| self.hit(idx))
                .collect(),
            popular: popular.into_iter().map(|idx| self.hit(idx)).collect(),
        }
    }

    /// Names from the root down to the node, or empty when `id` is unknown.
    pub fn category_path(&self, id: u32) -> Vec<String> {
        let Some(&idx) = self.by_id.get(&id) else {
            return Vec::new();
        };
        let mut path = Vec::new();
        let mut current = Some(idx);
        while let Some(idx) = current {
            path.push(self.nodes[idx].name.clone());
            current = self.nodes[idx].parent;
        }
        path.reverse();
        path
    }
}
