//! Service container - lazily-constructed singletons with a typed
//! dependency graph
//!
//! Factories are keyed by name and receive a map of their already-
//! resolved dependencies, so they never re-enter the container.
//! Cycles are rejected at registration time (graph walk over declared
//! dependencies) and again during resolution.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, warn};

use super::context::{ProjectContextPatch, ProjectContextView};
use super::error::ContainerError;

/// An opaque constructed service
pub type ServiceRef = Arc<dyn Any + Send + Sync>;

/// Dependencies handed to a factory, keyed by service name
pub type ResolvedDeps = HashMap<String, ServiceRef>;

type Factory = Box<dyn Fn(&ResolvedDeps) -> eyre::Result<ServiceRef> + Send + Sync>;
type LifecycleHook = Box<dyn Fn(ServiceRef) -> Pin<Box<dyn Future<Output = eyre::Result<()>> + Send>> + Send + Sync>;

/// One registered service definition
pub struct ServiceDefinition {
    factory: Factory,
    singleton: bool,
    dependencies: Vec<String>,
    on_start: Option<LifecycleHook>,
    on_stop: Option<LifecycleHook>,
}

impl ServiceDefinition {
    /// A singleton service with no dependencies
    pub fn singleton<F>(factory: F) -> Self
    where
        F: Fn(&ResolvedDeps) -> eyre::Result<ServiceRef> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            singleton: true,
            dependencies: Vec::new(),
            on_start: None,
            on_stop: None,
        }
    }

    /// A transient service: the factory runs on every resolve
    pub fn transient<F>(factory: F) -> Self
    where
        F: Fn(&ResolvedDeps) -> eyre::Result<ServiceRef> + Send + Sync + 'static,
    {
        Self {
            singleton: false,
            ..Self::singleton(factory)
        }
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.dependencies = dependencies.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn on_start<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(ServiceRef) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        self.on_start = Some(Box::new(move |service| Box::pin(hook(service))));
        self
    }

    pub fn on_stop<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(ServiceRef) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        self.on_stop = Some(Box::new(move |service| Box::pin(hook(service))));
        self
    }
}

/// Registry of lazily-constructed services
pub struct ServiceContainer {
    definitions: Mutex<HashMap<String, Arc<ServiceDefinition>>>,
    singletons: Mutex<HashMap<String, ServiceRef>>,
    project_context: RwLock<ProjectContextView>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self {
            definitions: Mutex::new(HashMap::new()),
            singletons: Mutex::new(HashMap::new()),
            project_context: RwLock::new(ProjectContextView::default()),
        }
    }

    /// Register a service definition
    ///
    /// Dependencies on names registered later are allowed; they are
    /// checked at validate/resolve time. A cycle among already-known
    /// names fails immediately.
    pub fn register(&self, name: &str, definition: ServiceDefinition) -> Result<(), ContainerError> {
        let mut definitions = self.definitions.lock().unwrap();
        if definitions.contains_key(name) {
            return Err(ContainerError::DuplicateService { name: name.to_string() });
        }
        definitions.insert(name.to_string(), Arc::new(definition));

        // Registration-time cycle check over the known subgraph
        if let Err(e) = Self::walk(&definitions, name, &mut Vec::new(), &mut HashSet::new(), false) {
            if matches!(e, ContainerError::DependencyCycle { .. }) {
                definitions.remove(name);
                return Err(e);
            }
        }

        debug!(name, "ServiceContainer::register");
        Ok(())
    }

    /// Dry walk of the whole graph: every registered name must resolve
    /// without constructing anything
    pub fn validate_dependencies(&self) -> Result<(), ContainerError> {
        let definitions = self.definitions.lock().unwrap();
        for name in definitions.keys() {
            Self::walk(&definitions, name, &mut Vec::new(), &mut HashSet::new(), true)?;
        }
        Ok(())
    }

    /// Depth-first walk detecting cycles and (optionally) missing names
    fn walk(
        definitions: &HashMap<String, Arc<ServiceDefinition>>,
        name: &str,
        stack: &mut Vec<String>,
        visited: &mut HashSet<String>,
        require_present: bool,
    ) -> Result<(), ContainerError> {
        if stack.iter().any(|n| n == name) {
            let mut chain = stack.clone();
            chain.push(name.to_string());
            return Err(ContainerError::DependencyCycle { chain });
        }
        if visited.contains(name) {
            return Ok(());
        }

        let Some(definition) = definitions.get(name) else {
            if require_present {
                return Err(ContainerError::DependencyNotFound {
                    name: name.to_string(),
                    chain: stack.clone(),
                });
            }
            return Ok(());
        };

        stack.push(name.to_string());
        for dep in &definition.dependencies {
            Self::walk(definitions, dep, stack, visited, require_present)?;
        }
        stack.pop();
        visited.insert(name.to_string());
        Ok(())
    }

    /// Resolve a service, constructing it (and its dependencies,
    /// depth-first) if needed
    pub fn resolve(&self, name: &str) -> Result<ServiceRef, ContainerError> {
        self.resolve_inner(name, &mut Vec::new())
    }

    /// Resolve and downcast to a concrete type
    pub fn resolve_as<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ContainerError> {
        let service = self.resolve(name)?;
        service
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch { name: name.to_string() })
    }

    fn resolve_inner(&self, name: &str, stack: &mut Vec<String>) -> Result<ServiceRef, ContainerError> {
        if stack.iter().any(|n| n == name) {
            let mut chain = stack.clone();
            chain.push(name.to_string());
            return Err(ContainerError::DependencyCycle { chain });
        }

        let definition = {
            let definitions = self.definitions.lock().unwrap();
            definitions
                .get(name)
                .cloned()
                .ok_or_else(|| ContainerError::DependencyNotFound {
                    name: name.to_string(),
                    chain: stack.clone(),
                })?
        };

        // Singleton fast path: constructed once, read thereafter
        if definition.singleton {
            if let Some(existing) = self.singletons.lock().unwrap().get(name) {
                return Ok(existing.clone());
            }
        }

        stack.push(name.to_string());
        let mut deps = ResolvedDeps::new();
        for dep in &definition.dependencies {
            deps.insert(dep.clone(), self.resolve_inner(dep, stack)?);
        }
        stack.pop();

        let construct = || {
            (definition.factory)(&deps).map_err(|e| ContainerError::DependencyConstructionFailed {
                name: name.to_string(),
                cause: e.to_string(),
            })
        };

        if definition.singleton {
            // Constructed under the lock: a concurrent resolve of the
            // same name waits for the first instance. Factories never
            // re-enter the container.
            let mut singletons = self.singletons.lock().unwrap();
            if let Some(existing) = singletons.get(name) {
                return Ok(existing.clone());
            }
            let service = construct()?;
            singletons.insert(name.to_string(), service.clone());
            return Ok(service);
        }

        debug!(name, "ServiceContainer::resolve: constructed transient");
        construct()
    }

    /// Run every registered on_start hook; failures are collected,
    /// never thrown. The caller decides whether a failure is fatal.
    pub async fn start_all_services(&self) -> Vec<(String, String)> {
        let names: Vec<String> = {
            let definitions = self.definitions.lock().unwrap();
            definitions
                .iter()
                .filter(|(_, d)| d.on_start.is_some())
                .map(|(n, _)| n.clone())
                .collect()
        };

        let mut failed = Vec::new();
        for name in names {
            let result = self.run_hook(&name, HookKind::Start).await;
            if let Err(e) = result {
                warn!(service = %name, error = %e, "Service failed to start");
                failed.push((name, e.to_string()));
            }
        }
        info!(failed = failed.len(), "Started services");
        failed
    }

    /// Run every registered on_stop hook; failures are collected
    pub async fn stop_all_services(&self) -> Vec<(String, String)> {
        let names: Vec<String> = {
            let definitions = self.definitions.lock().unwrap();
            definitions
                .iter()
                .filter(|(_, d)| d.on_stop.is_some())
                .map(|(n, _)| n.clone())
                .collect()
        };

        let mut failed = Vec::new();
        for name in names {
            if let Err(e) = self.run_hook(&name, HookKind::Stop).await {
                warn!(service = %name, error = %e, "Service failed to stop");
                failed.push((name, e.to_string()));
            }
        }
        failed
    }

    async fn run_hook(&self, name: &str, kind: HookKind) -> eyre::Result<()> {
        let definition = {
            let definitions = self.definitions.lock().unwrap();
            definitions.get(name).cloned()
        };
        let Some(definition) = definition else {
            return Ok(());
        };

        let service = self.resolve(name).map_err(|e| eyre::eyre!(e.to_string()))?;
        let hook = match kind {
            HookKind::Start => definition.on_start.as_ref(),
            HookKind::Stop => definition.on_stop.as_ref(),
        };
        match hook {
            Some(hook) => hook(service).await,
            None => Ok(()),
        }
    }

    /// Read the current project context
    pub fn project_context(&self) -> ProjectContextView {
        self.project_context.read().unwrap().clone()
    }

    /// Apply a partial update to the project context
    pub fn set_project_context(&self, patch: ProjectContextPatch) {
        let mut context = self.project_context.write().unwrap();
        *context = context.apply(patch);
        debug!(?context, "ServiceContainer::set_project_context");
    }

    /// Registered service names
    pub fn service_names(&self) -> Vec<String> {
        self.definitions.lock().unwrap().keys().cloned().collect()
    }
}

impl Default for ServiceContainer {
    fn default() -> Self {
        Self::new()
    }
}

enum HookKind {
    Start,
    Stop,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn value_service(n: usize) -> ServiceDefinition {
        ServiceDefinition::singleton(move |_| Ok(Arc::new(n) as ServiceRef))
    }

    #[test]
    fn test_resolve_singleton_identity() {
        let container = ServiceContainer::new();
        container.register("answer", value_service(42)).unwrap();

        let a = container.resolve_as::<usize>("answer").unwrap();
        let b = container.resolve_as::<usize>("answer").unwrap();
        assert_eq!(*a, 42);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_transient_constructed_each_time() {
        let container = ServiceContainer::new();
        let built = Arc::new(AtomicUsize::new(0));
        let built_clone = built.clone();

        container
            .register(
                "counter",
                ServiceDefinition::transient(move |_| {
                    built_clone.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(()) as ServiceRef)
                }),
            )
            .unwrap();

        container.resolve("counter").unwrap();
        container.resolve("counter").unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dependencies_resolved_depth_first() {
        let container = ServiceContainer::new();
        container.register("base", value_service(7)).unwrap();
        container
            .register(
                "derived",
                ServiceDefinition::singleton(|deps| {
                    let base = deps["base"].clone().downcast::<usize>().unwrap();
                    Ok(Arc::new(*base * 2) as ServiceRef)
                })
                .with_dependencies(&["base"]),
            )
            .unwrap();

        let derived = container.resolve_as::<usize>("derived").unwrap();
        assert_eq!(*derived, 14);
    }

    #[test]
    fn test_missing_dependency() {
        let container = ServiceContainer::new();
        container
            .register(
                "orphan",
                ServiceDefinition::singleton(|_| Ok(Arc::new(()) as ServiceRef)).with_dependencies(&["ghost"]),
            )
            .unwrap();

        let err = container.resolve("orphan").unwrap_err();
        match err {
            ContainerError::DependencyNotFound { name, chain } => {
                assert_eq!(name, "ghost");
                assert_eq!(chain, vec!["orphan".to_string()]);
            }
            other => panic!("Expected DependencyNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_rejected_at_registration() {
        let container = ServiceContainer::new();
        container
            .register(
                "a",
                ServiceDefinition::singleton(|_| Ok(Arc::new(()) as ServiceRef)).with_dependencies(&["b"]),
            )
            .unwrap();

        // Registering b closes the a -> b -> a cycle
        let err = container
            .register(
                "b",
                ServiceDefinition::singleton(|_| Ok(Arc::new(()) as ServiceRef)).with_dependencies(&["a"]),
            )
            .unwrap_err();
        assert!(matches!(err, ContainerError::DependencyCycle { .. }));
    }

    #[test]
    fn test_self_cycle_rejected() {
        let container = ServiceContainer::new();
        let err = container
            .register(
                "narcissus",
                ServiceDefinition::singleton(|_| Ok(Arc::new(()) as ServiceRef)).with_dependencies(&["narcissus"]),
            )
            .unwrap_err();
        assert!(matches!(err, ContainerError::DependencyCycle { .. }));
    }

    #[test]
    fn test_factory_error_wrapped() {
        let container = ServiceContainer::new();
        container
            .register(
                "broken",
                ServiceDefinition::singleton(|_| Err(eyre::eyre!("boom"))),
            )
            .unwrap();

        let err = container.resolve("broken").unwrap_err();
        match err {
            ContainerError::DependencyConstructionFailed { name, cause } => {
                assert_eq!(name, "broken");
                assert!(cause.contains("boom"));
            }
            other => panic!("Expected construction failure, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_dependencies_dry_walk() {
        let container = ServiceContainer::new();
        let built = Arc::new(AtomicUsize::new(0));
        let built_clone = built.clone();

        container
            .register(
                "lazy",
                ServiceDefinition::singleton(move |_| {
                    built_clone.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(()) as ServiceRef)
                })
                .with_dependencies(&["missing"]),
            )
            .unwrap();

        assert!(container.validate_dependencies().is_err());
        // Dry walk constructs nothing
        assert_eq!(built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_duplicate_registration() {
        let container = ServiceContainer::new();
        container.register("svc", value_service(1)).unwrap();
        let err = container.register("svc", value_service(2)).unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateService { .. }));
    }

    #[tokio::test]
    async fn test_lifecycle_hooks_collect_failures() {
        let container = ServiceContainer::new();
        let started = Arc::new(AtomicUsize::new(0));
        let started_clone = started.clone();

        container
            .register(
                "good",
                ServiceDefinition::singleton(|_| Ok(Arc::new(()) as ServiceRef)).on_start(move |_| {
                    let started = started_clone.clone();
                    async move {
                        started.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            )
            .unwrap();

        container
            .register(
                "bad",
                ServiceDefinition::singleton(|_| Ok(Arc::new(()) as ServiceRef))
                    .on_start(|_| async { Err(eyre::eyre!("refused to start")) }),
            )
            .unwrap();

        let failed = container.start_all_services().await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "bad");
    }

    #[test]
    fn test_project_context_patch() {
        let container = ServiceContainer::new();
        assert_eq!(container.project_context(), ProjectContextView::default());

        container.set_project_context(ProjectContextPatch {
            project_id: Some("app".to_string()),
            ..Default::default()
        });
        container.set_project_context(ProjectContextPatch {
            project_path: Some(PathBuf::from("/work/app")),
            ..Default::default()
        });

        let view = container.project_context();
        assert_eq!(view.project_id.as_deref(), Some("app"));
        assert_eq!(view.project_path, Some(PathBuf::from("/work/app")));
    }
}
