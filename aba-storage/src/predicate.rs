// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use kube::core::{Expression, Selector, SelectorExt};
use kube::Resource;

use crate::error::{Result, StorageError};

static SUPPORTED_FIELDS: &[&str] = &["metadata.name", "metadata.namespace"];

/// Parse a comma separated list of `key=value`, `key==value` or `key!=value`
fn parse_requirements(selector: &str) -> Result<Vec<Expression>> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(|term| {
            let (key, equal, value) = if let Some((k, v)) = term.split_once("!=") {
                (k, false, v)
            } else if let Some((k, v)) = term.split_once("==") {
                (k, true, v)
            } else if let Some((k, v)) = term.split_once('=') {
                (k, true, v)
            } else {
                return Err(StorageError::InvalidSelector(format!("{:?} is not an equality requirement", term)));
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(StorageError::InvalidSelector(format!("{:?} has an empty key", term)));
            }
            let (key, value) = (key.to_string(), value.trim().to_string());
            Ok(if equal {
                Expression::Equal(key, value)
            } else {
                Expression::NotEqual(key, value)
            })
        })
        .collect()
}

fn expression_key(expression: &Expression) -> &str {
    match expression {
        Expression::In(key, _)
        | Expression::NotIn(key, _)
        | Expression::Equal(key, _)
        | Expression::NotEqual(key, _)
        | Expression::Exists(key)
        | Expression::DoesNotExist(key) => key,
    }
}

type Filter<K> = Arc<dyn Fn(&K) -> bool + Send + Sync>;

/// Client side filter applied to decoded objects during list and watch
pub struct SelectionPredicate<K> {
    labels: Selector,
    fields: Selector,
    filter: Option<Filter<K>>,
}

impl<K> Clone for SelectionPredicate<K> {
    fn clone(&self) -> Self {
        SelectionPredicate {
            labels: self.labels.clone(),
            fields: self.fields.clone(),
            filter: self.filter.clone(),
        }
    }
}

impl<K> Debug for SelectionPredicate<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SelectionPredicate")
            .field("labels", &self.labels)
            .field("fields", &self.fields)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

impl<K> Default for SelectionPredicate<K> {
    fn default() -> Self {
        SelectionPredicate {
            labels: Selector::default(),
            fields: Selector::default(),
            filter: None,
        }
    }
}

impl<K: Resource> SelectionPredicate<K> {
    /// Predicate matching every object
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn parse(label_selector: &str, field_selector: &str) -> Result<Self> {
        Self::everything()
            .with_label_selector(label_selector)?
            .with_field_selector(field_selector)
    }

    pub fn with_label_selector(mut self, selector: &str) -> Result<Self> {
        self.labels.extend(parse_requirements(selector)?);
        Ok(self)
    }

    pub fn with_field_selector(mut self, selector: &str) -> Result<Self> {
        let fields = parse_requirements(selector)?;
        if let Some(unsupported) = fields.iter().map(expression_key).find(|key| !SUPPORTED_FIELDS.contains(key)) {
            return Err(StorageError::InvalidSelector(format!(
                "field {:?} is not supported, expected one of {}",
                unsupported,
                SUPPORTED_FIELDS.join(", ")
            )));
        }
        self.fields.extend(fields);
        Ok(self)
    }

    /// Add an arbitrary test on top of the selectors
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&K) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn is_everything(&self) -> bool {
        self.labels.selects_all() && self.fields.selects_all() && self.filter.is_none()
    }

    pub fn matches(&self, object: &K) -> bool {
        let meta = object.meta();
        let no_labels = BTreeMap::new();
        let fields: BTreeMap<String, String> = [
            ("metadata.name", meta.name.as_ref()),
            ("metadata.namespace", meta.namespace.as_ref()),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| (field.to_string(), v.clone())))
        .collect();

        self.labels.matches(meta.labels.as_ref().unwrap_or(&no_labels))
            && self.fields.matches(&fields)
            && self.filter.as_ref().is_none_or(|filter| filter(object))
    }
}
