//! Built-in handlers.

mod echo;
mod sample;
mod sync_sample_data;

pub use echo::EchoHandler;
pub use sample::SampleHandler;
pub use sync_sample_data::SyncSampleDataHandler;

use crate::error::DuplicateHandlerName;
use crate::registry::HandlerRegistry;

/// The handler registry assembled at startup. Deployments extend this with
/// their own registrations before handing the registry to the worker pool.
pub fn builtin_registry() -> Result<HandlerRegistry, DuplicateHandlerName> {
    let mut registry = HandlerRegistry::new();
    registry.register("echo", || Box::new(EchoHandler))?;
    registry.register("sample", || Box::new(SampleHandler))?;
    registry.register("sync_sample_data", || Box::new(SyncSampleDataHandler))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_register_cleanly() {
        let registry = builtin_registry().unwrap();
        assert!(registry.contains("echo"));
        assert!(registry.contains("sample"));
        assert!(registry.contains("sync_sample_data"));
    }
}
