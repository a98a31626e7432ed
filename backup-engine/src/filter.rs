//! Include/exclude membership filters over string sets.
//!
//! An empty filter matches everything, whether it is an include or an exclude
//! filter. Object types, schemas and relation names are all filtered through
//! this one type.

use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    items: HashSet<String>,
    is_exclude: bool,
}

impl FilterSet {
    /// Filter that keeps only the listed items
    pub fn include<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: items.into_iter().map(Into::into).collect(),
            is_exclude: false,
        }
    }

    /// Filter that drops the listed items
    pub fn exclude<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: items.into_iter().map(Into::into).collect(),
            is_exclude: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item: &str) -> bool {
        self.items.contains(item)
    }

    pub fn matches_filter(&self, item: &str) -> bool {
        if self.items.is_empty() {
            return true;
        }
        let contained = self.items.contains(item);
        if self.is_exclude {
            !contained
        } else {
            contained
        }
    }

    /// Unordered set equality; duplicates and order in the source lists are ignored.
    pub fn same_members(&self, other: &FilterSet) -> bool {
        self.items == other.items
    }
}

/// Compare two string lists as unordered sets.
pub fn same_set(a: &[String], b: &[String]) -> bool {
    FilterSet::include(a.iter().cloned()).same_members(&FilterSet::include(b.iter().cloned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filters_match_everything() {
        let include = FilterSet::include(Vec::<String>::new());
        let exclude = FilterSet::exclude(Vec::<String>::new());

        assert!(include.matches_filter("public"));
        assert!(exclude.matches_filter("public"));
    }

    #[test]
    fn test_include_filter() {
        let set = FilterSet::include(["public", "sales"]);

        assert!(set.matches_filter("public"));
        assert!(set.matches_filter("sales"));
        assert!(!set.matches_filter("hr"));
    }

    #[test]
    fn test_exclude_filter() {
        let set = FilterSet::exclude(["INDEX"]);

        assert!(!set.matches_filter("INDEX"));
        assert!(set.matches_filter("TABLE"));
    }

    #[test]
    fn test_same_set_ignores_order_and_duplicates() {
        let a = vec!["s.t1".to_string(), "s.t2".to_string(), "s.t1".to_string()];
        let b = vec!["s.t2".to_string(), "s.t1".to_string()];
        let c = vec!["s.t2".to_string()];

        assert!(same_set(&a, &b));
        assert!(!same_set(&a, &c));
        assert!(same_set(&[], &[]));
    }
}
