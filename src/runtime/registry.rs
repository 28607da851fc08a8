//! Immutable registry of orchestrator and activity functions.
//!
//! Built once at process start via the builder and shared read-only by both
//! executors. Lookup is by exact, case-sensitive name. Typed registration
//! variants wrap the JSON codec around a handler so user functions work with
//! their own input/output types.

use std::collections::HashMap;
use std::sync::Arc;

use crate::codec;
use crate::runtime::{ActivityHandler, FnActivity, FnOrchestration, OrchestrationHandler};
use crate::{ActivityContext, OrchestrationContext};

/// Shared, read-only lookup of registered functions.
#[derive(Clone, Default)]
pub struct Registry {
    orchestrators: Arc<HashMap<String, Arc<dyn OrchestrationHandler>>>,
    activities: Arc<HashMap<String, Arc<dyn ActivityHandler>>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get_orchestrator(&self, name: &str) -> Option<Arc<dyn OrchestrationHandler>> {
        self.orchestrators.get(name).cloned()
    }

    pub fn get_activity(&self, name: &str) -> Option<Arc<dyn ActivityHandler>> {
        self.activities.get(name).cloned()
    }

    pub fn has_orchestrator(&self, name: &str) -> bool {
        self.orchestrators.contains_key(name)
    }

    pub fn has_activity(&self, name: &str) -> bool {
        self.activities.contains_key(name)
    }
}

/// Builder for [`Registry`]. Duplicate registrations are collected as errors
/// and reported at `build` time rather than silently replacing handlers.
#[derive(Default)]
pub struct RegistryBuilder {
    orchestrators: HashMap<String, Arc<dyn OrchestrationHandler>>,
    activities: HashMap<String, Arc<dyn ActivityHandler>>,
    errors: Vec<String>,
}

impl RegistryBuilder {
    pub fn register_orchestrator<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(OrchestrationContext, String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String, String>> + Send + 'static,
    {
        let name = name.into();
        if self.orchestrators.contains_key(&name) {
            self.errors.push(format!("duplicate orchestrator registration: {name}"));
            return self;
        }
        self.orchestrators.insert(name, Arc::new(FnOrchestration(f)));
        self
    }

    pub fn register_orchestrator_handler(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn OrchestrationHandler>,
    ) -> Self {
        let name = name.into();
        if self.orchestrators.contains_key(&name) {
            self.errors.push(format!("duplicate orchestrator registration: {name}"));
            return self;
        }
        self.orchestrators.insert(name, handler);
        self
    }

    pub fn register_orchestrator_typed<In, Out, F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        In: serde::de::DeserializeOwned + Send + 'static,
        Out: serde::Serialize + Send + 'static,
        F: Fn(OrchestrationContext, In) -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = Result<Out, String>> + Send + 'static,
    {
        let wrapper = move |ctx: OrchestrationContext, input_text: String| {
            let f_inner = f.clone();
            async move {
                let input: In = codec::decode(&input_text)?;
                let out: Out = f_inner(ctx, input).await?;
                codec::encode(&out)
            }
        };
        self.register_orchestrator(name, wrapper)
    }

    pub fn register_activity<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ActivityContext, String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String, String>> + Send + 'static,
    {
        let name = name.into();
        if self.activities.contains_key(&name) {
            self.errors.push(format!("duplicate activity registration: {name}"));
            return self;
        }
        self.activities.insert(name, Arc::new(FnActivity(f)));
        self
    }

    pub fn register_activity_typed<In, Out, F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        In: serde::de::DeserializeOwned + Send + 'static,
        Out: serde::Serialize + Send + 'static,
        F: Fn(ActivityContext, In) -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = Result<Out, String>> + Send + 'static,
    {
        let wrapper = move |ctx: ActivityContext, input_text: String| {
            let f_inner = f.clone();
            async move {
                let input: In = codec::decode(&input_text)?;
                let out: Out = f_inner(ctx, input).await?;
                codec::encode(&out)
            }
        };
        self.register_activity(name, wrapper)
    }

    /// Finalize the registry.
    ///
    /// # Errors
    ///
    /// Returns the joined registration errors if any name was registered
    /// more than once.
    pub fn build(self) -> Result<Registry, String> {
        if self.errors.is_empty() {
            Ok(Registry {
                orchestrators: Arc::new(self.orchestrators),
                activities: Arc::new(self.activities),
            })
        } else {
            Err(self.errors.join("; "))
        }
    }
}
