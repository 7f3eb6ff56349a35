use std::collections::{BTreeMap, BTreeSet};

/// Selection of notification categories to subscribe to.
///
/// Maps a category name to a set of filter values. A category with an empty
/// set subscribes to everything it covers; filter values narrow it down.
/// Category and value strings must not contain spaces or colons; those are
/// wire delimiters and are not escaped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    categories: BTreeMap<String, BTreeSet<String>>,
}

impl Selection {
    /// Creates an empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an unfiltered category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.entry(category.into()).or_default();
        self
    }

    /// Adds one filter value under a category.
    pub fn with_filter(
        mut self,
        category: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.categories
            .entry(category.into())
            .or_default()
            .insert(value.into());
        self
    }

    /// Returns true when no categories are selected.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Encodes the selection as the wire-format subscription string.
    ///
    /// An unfiltered category is emitted as its lowercased name; a filtered
    /// category is emitted as `Category:value` per value with the original
    /// casing preserved. The asymmetry is part of the wire format.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        for (category, values) in &self.categories {
            if values.is_empty() {
                out.push_str(&category.to_lowercase());
                out.push(' ');
            } else {
                for value in values {
                    out.push_str(category);
                    out.push(':');
                    out.push_str(value);
                    out.push(' ');
                }
            }
        }
        out.trim_end().to_string()
    }
}

impl From<BTreeMap<String, BTreeSet<String>>> for Selection {
    fn from(categories: BTreeMap<String, BTreeSet<String>>) -> Self {
        Self { categories }
    }
}
