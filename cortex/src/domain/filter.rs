// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Equality filters over vector metadata.

use crate::domain::vector::Metadata;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Equals(String, Value),
    OneOf(String, Vec<Value>),
}

/// Conjunction of conditions. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    conditions: Vec<Condition>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Equals(key.into(), value.into()));
        self
    }

    pub fn one_of<V: Into<Value>>(
        mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.conditions.push(Condition::OneOf(
            key.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Equals(key, expected) => metadata.get(key) == Some(expected),
            Condition::OneOf(key, allowed) => metadata
                .get(key)
                .is_some_and(|actual| allowed.contains(actual)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(pairs: &[(&str, Value)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_equality_and_absence() {
        let filter = MetadataFilter::new().equals("lang", "rust");
        assert!(filter.matches(&metadata(&[("lang", json!("rust"))])));
        assert!(!filter.matches(&metadata(&[("lang", json!("go"))])));
        assert!(!filter.matches(&Metadata::new()));
    }

    #[test]
    fn test_one_of_and_conjunction() {
        let filter = MetadataFilter::new()
            .one_of("ns", ["a", "b"])
            .equals("tier", 2);
        assert!(filter.matches(&metadata(&[("ns", json!("b")), ("tier", json!(2))])));
        assert!(!filter.matches(&metadata(&[("ns", json!("c")), ("tier", json!(2))])));
        assert!(MetadataFilter::new().matches(&Metadata::new()));
    }
}
