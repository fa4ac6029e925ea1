use std::collections::BTreeMap;

use crate::DynamicObject;

/// Equality based label selector. All pairs must match; an empty selector
/// matches every object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty()
    }

    pub fn matches(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k).map(|actual| actual == v).unwrap_or(false))
    }
}

/// Options for list calls on any [`crate::ObjectReader`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// `None` lists across every namespace the reader can see
    pub namespace: Option<String>,
    pub label_selector: LabelSelector,
}

impl ListOptions {
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    pub fn with_label(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.label_selector = self.label_selector.with(key, value);
        self
    }

    /// Applies the namespace and label filters to a single object.
    pub fn matches(
        &self,
        object: &DynamicObject,
    ) -> bool {
        if let Some(ns) = &self.namespace {
            if &object.meta.namespace != ns {
                return false;
            }
        }
        self.label_selector.matches(&object.meta.labels)
    }
}
