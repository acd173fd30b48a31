//! Handler registry.
//!
//! Built once at startup from an explicit list of registrations and
//! read-only afterwards. A factory yields a fresh handler value per
//! invocation.

use std::collections::HashMap;

use crate::error::DuplicateHandlerName;
use crate::handler::Handler;

type HandlerFactory = Box<dyn Fn() -> Box<dyn Handler> + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`. Duplicate names are a startup-time
    /// fatal error.
    pub fn register<F>(&mut self, name: &str, factory: F) -> Result<(), DuplicateHandlerName>
    where
        F: Fn() -> Box<dyn Handler> + Send + Sync + 'static,
    {
        if self.handlers.contains_key(name) {
            return Err(DuplicateHandlerName(name.to_string()));
        }
        self.handlers.insert(name.to_string(), Box::new(factory));
        Ok(())
    }

    /// A fresh handler instance, or None when the name is unknown.
    pub fn instantiate(&self, name: &str) -> Option<Box<dyn Handler>> {
        self.handlers.get(name).map(|factory| factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerContext;
    use async_trait::async_trait;
    use serde_json::Value;

    struct Nop;

    #[async_trait]
    impl Handler for Nop {
        async fn execute(&self, _ctx: &HandlerContext, params: Value) -> anyhow::Result<Value> {
            Ok(params)
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = HandlerRegistry::new();
        registry.register("nop", || Box::new(Nop)).unwrap();
        let err = registry.register("nop", || Box::new(Nop)).unwrap_err();
        assert_eq!(err.0, "nop");
    }

    #[test]
    fn instantiate_yields_fresh_values() {
        let mut registry = HandlerRegistry::new();
        registry.register("nop", || Box::new(Nop)).unwrap();
        assert!(registry.instantiate("nop").is_some());
        assert!(registry.instantiate("missing").is_none());
        assert!(registry.contains("nop"));
        assert_eq!(registry.len(), 1);
    }
}
