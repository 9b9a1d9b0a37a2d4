// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Handler Registry - Agent Kind Resolution
//
// Maps agent kinds to the handler that executes their tasks. Registering a
// new kind is the only step needed to introduce a new sort of agent.

use crate::domain::handler::TaskHandler;
use crate::domain::error::SwarmError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, replacing any previous one.
    pub fn register(&self, kind: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        let kind = kind.into();
        if self.handlers.write().insert(kind.clone(), handler).is_some() {
            warn!(kind = %kind, "Replaced existing task handler");
        } else {
            info!(kind = %kind, "Registered task handler");
        }
    }

    pub fn resolve(&self, kind: &str) -> Result<Arc<dyn TaskHandler>, SwarmError> {
        self.handlers
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| SwarmError::NoHandler(kind.to_string()))
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::handler::TaskContext;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl TaskHandler for Echo {
        async fn handle(&self, context: TaskContext) -> anyhow::Result<Vec<u8>> {
            Ok(context.payload)
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = HandlerRegistry::new();
        registry.register("reviewer", Arc::new(Echo));
        registry.register("coder", Arc::new(Echo));

        assert!(registry.resolve("reviewer").is_ok());
        assert!(matches!(
            registry.resolve("planner"),
            Err(SwarmError::NoHandler(kind)) if kind == "planner"
        ));
        assert_eq!(registry.kinds(), vec!["coder".to_string(), "reviewer".to_string()]);
    }
}
