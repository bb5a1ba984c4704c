//! Lazily constructed, dependency-resolved service container.
//!
//! Services are registered as factories with a static list of dependency
//! names. The first `get` for a name resolves the dependency graph depth-first,
//! rejecting unknown names and cycles before anything is constructed, then
//! builds each missing service in dependency order and memoizes it.
//!
//! A service whose factory fails is parked in [`ServiceState::Error`] and
//! every later `get` fails fast with the stored cause until
//! [`ServiceRegistry::clear_cache`] is called.
//!
//! The registry uses `RefCell` internally and is meant to be owned by one
//! generation run on one thread.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::Clock;
use crate::diagnostic::{GeneratorError, Result};

/// A collaborator managed by the registry.
pub trait Service: Any {
    /// Probes the service. An `Err` is reported as unhealthy.
    fn health_check(&self) -> Result<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }

    /// Releases resources held by the service.
    fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// A constructed service, usable both as `dyn Service` and for typed downcasts.
#[derive(Clone)]
pub struct ServiceHandle {
    service: Rc<dyn Service>,
    any: Rc<dyn Any>,
}

impl ServiceHandle {
    pub fn new<T: Service>(service: T) -> Self {
        let rc = Rc::new(service);
        Self {
            service: rc.clone(),
            any: rc,
        }
    }

    pub fn service(&self) -> &dyn Service {
        &*self.service
    }

    pub fn downcast<T: Service>(&self) -> Option<Rc<T>> {
        self.any.clone().downcast::<T>().ok()
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle").finish_non_exhaustive()
    }
}

/// Builds a service, pulling its dependencies from the registry.
pub type ServiceFactory = Rc<dyn Fn(&ServiceRegistry) -> Result<ServiceHandle>>;

/// Lifecycle state of a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Uninitialized,
    Initializing,
    Running,
    Error,
}

/// Health of one service or of the registry as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Probe result for one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Aggregate health of every initialized service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    pub services: BTreeMap<String, ServiceHealth>,
}

/// Counts of services by lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryStatistics {
    pub registered: usize,
    pub initialized: usize,
    pub errored: usize,
    pub uninitialized: usize,
    pub initialization_order: Vec<String>,
}

/// Outcome of tearing every service down.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ShutdownReport {
    pub stopped: Vec<String>,
    pub errors: Vec<(String, String)>,
}

struct ServiceEntry {
    dependencies: Vec<String>,
    factory: ServiceFactory,
    state: ServiceState,
    instance: Option<ServiceHandle>,
    error: Option<String>,
    initialized_at: Option<DateTime<Utc>>,
}

impl ServiceEntry {
    fn reset(&mut self) {
        self.state = ServiceState::Uninitialized;
        self.instance = None;
        self.error = None;
        self.initialized_at = None;
    }
}

/// The service container.
pub struct ServiceRegistry {
    entries: RefCell<BTreeMap<String, ServiceEntry>>,
    init_order: RefCell<Vec<String>>,
    clock: Rc<dyn Clock>,
}

impl ServiceRegistry {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            entries: RefCell::new(BTreeMap::new()),
            init_order: RefCell::new(Vec::new()),
            clock,
        }
    }

    /// Registers (or replaces) a service definition.
    ///
    /// Replacing a definition that has already been constructed, or that
    /// failed, requires [`clear_cache`](Self::clear_cache) first.
    pub fn register<F>(&self, name: &str, dependencies: &[&str], factory: F) -> Result<()>
    where
        F: Fn(&ServiceRegistry) -> Result<ServiceHandle> + 'static,
    {
        let mut entries = self.entries.borrow_mut();
        if let Some(existing) = entries.get(name) {
            if existing.state != ServiceState::Uninitialized {
                return Err(GeneratorError::ServiceAlreadyInitialized {
                    name: name.to_string(),
                });
            }
        }
        entries.insert(
            name.to_string(),
            ServiceEntry {
                dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
                factory: Rc::new(factory),
                state: ServiceState::Uninitialized,
                instance: None,
                error: None,
                initialized_at: None,
            },
        );
        tracing::debug!(service = name, ?dependencies, "service registered");
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.borrow().contains_key(name)
    }

    pub fn state(&self, name: &str) -> Option<ServiceState> {
        self.entries.borrow().get(name).map(|e| e.state)
    }

    /// Returns the service, constructing it and its dependencies on first use.
    pub fn get_service(&self, name: &str) -> Result<ServiceHandle> {
        for service in self.resolution_order(name)? {
            self.initialize(&service)?;
        }

        let entries = self.entries.borrow();
        entries
            .get(name)
            .and_then(|e| e.instance.clone())
            .ok_or_else(|| GeneratorError::ServiceNotFound {
                name: name.to_string(),
            })
    }

    /// Typed form of [`get_service`](Self::get_service).
    pub fn get<T: Service>(&self, name: &str) -> Result<Rc<T>> {
        self.get_service(name)?
            .downcast::<T>()
            .ok_or_else(|| GeneratorError::Service {
                name: name.to_string(),
                cause: format!("registered instance is not a {}", std::any::type_name::<T>()),
            })
    }

    /// Dependency-first construction order for `name`.
    pub fn resolution_order(&self, name: &str) -> Result<Vec<String>> {
        let entries = self.entries.borrow();
        let mut sorted = Vec::new();
        let mut visited = BTreeSet::new();
        let mut stack = Vec::new();
        visit(&entries, name, &mut visited, &mut stack, &mut sorted)?;
        Ok(sorted)
    }

    /// Checks the whole static graph for unknown dependencies and cycles.
    pub fn validate_dependencies(&self) -> Result<()> {
        let names: Vec<String> = self.entries.borrow().keys().cloned().collect();
        for name in names {
            self.resolution_order(&name)?;
        }
        Ok(())
    }

    fn initialize(&self, name: &str) -> Result<()> {
        let factory = {
            let mut entries = self.entries.borrow_mut();
            let entry = entries.get_mut(name).ok_or_else(|| GeneratorError::ServiceNotFound {
                name: name.to_string(),
            })?;

            match entry.state {
                ServiceState::Running => return Ok(()),
                ServiceState::Error => {
                    return Err(GeneratorError::Service {
                        name: name.to_string(),
                        cause: entry.error.clone().unwrap_or_default(),
                    })
                }
                ServiceState::Initializing => {
                    return Err(GeneratorError::CircularDependency {
                        cycle: vec![name.to_string(), name.to_string()],
                    })
                }
                ServiceState::Uninitialized => {
                    entry.state = ServiceState::Initializing;
                    entry.factory.clone()
                }
            }
        };

        tracing::debug!(service = name, "initializing service");
        let built = factory(self);

        let mut entries = self.entries.borrow_mut();
        let entry = entries.get_mut(name).ok_or_else(|| GeneratorError::ServiceNotFound {
            name: name.to_string(),
        })?;

        match built {
            Ok(handle) => {
                entry.state = ServiceState::Running;
                entry.instance = Some(handle);
                entry.initialized_at = Some(self.clock.now());
                self.init_order.borrow_mut().push(name.to_string());
                Ok(())
            }
            Err(e) => {
                let cause = e.to_string();
                tracing::warn!(service = name, error = %cause, "service construction failed");
                entry.state = ServiceState::Error;
                entry.error = Some(cause.clone());
                Err(GeneratorError::Service {
                    name: name.to_string(),
                    cause,
                })
            }
        }
    }

    /// Names of running services in the order they were constructed.
    pub fn initialized_services(&self) -> Vec<String> {
        self.init_order.borrow().clone()
    }

    /// Forgets every constructed instance and stored failure.
    pub fn clear_cache(&self) {
        for entry in self.entries.borrow_mut().values_mut() {
            entry.reset();
        }
        self.init_order.borrow_mut().clear();
    }

    /// Probes every initialized service. A failing probe is recorded as
    /// unhealthy and never aborts the sweep.
    pub fn health_check(&self) -> HealthReport {
        let mut services = BTreeMap::new();

        for name in self.initialized_services() {
            let handle = self.entries.borrow().get(&name).and_then(|e| e.instance.clone());
            let Some(handle) = handle else { continue };

            let health = match handle.service().health_check() {
                Ok(status) => ServiceHealth { status, message: None },
                Err(e) => ServiceHealth {
                    status: HealthStatus::Unhealthy,
                    message: Some(e.to_string()),
                },
            };
            services.insert(name, health);
        }

        HealthReport {
            status: aggregate_health(services.values().map(|h| h.status)),
            checked_at: self.clock.now(),
            services,
        }
    }

    pub fn statistics(&self) -> RegistryStatistics {
        let entries = self.entries.borrow();
        let count = |state: ServiceState| entries.values().filter(|e| e.state == state).count();

        RegistryStatistics {
            registered: entries.len(),
            initialized: count(ServiceState::Running),
            errored: count(ServiceState::Error),
            uninitialized: count(ServiceState::Uninitialized),
            initialization_order: self.initialized_services(),
        }
    }

    /// Shuts services down in reverse construction order.
    ///
    /// Individual failures are collected, not propagated; every entry is
    /// reset afterwards regardless.
    pub fn shutdown_all_services(&self) -> ShutdownReport {
        let mut report = ShutdownReport::default();

        for name in self.initialized_services().into_iter().rev() {
            let handle = self.entries.borrow().get(&name).and_then(|e| e.instance.clone());
            let Some(handle) = handle else { continue };

            match handle.service().shutdown() {
                Ok(()) => report.stopped.push(name),
                Err(e) => {
                    tracing::warn!(service = %name, error = %e, "service shutdown failed");
                    report.errors.push((name, e.to_string()));
                }
            }
        }

        self.clear_cache();
        report
    }
}

/// All healthy is healthy, all unhealthy is unhealthy, anything else is degraded.
pub fn aggregate_health(statuses: impl IntoIterator<Item = HealthStatus>) -> HealthStatus {
    let statuses: Vec<HealthStatus> = statuses.into_iter().collect();
    if statuses.iter().all(|s| *s == HealthStatus::Healthy) {
        HealthStatus::Healthy
    } else if statuses.iter().all(|s| *s == HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Degraded
    }
}

fn visit(
    entries: &BTreeMap<String, ServiceEntry>,
    name: &str,
    visited: &mut BTreeSet<String>,
    stack: &mut Vec<String>,
    sorted: &mut Vec<String>,
) -> Result<()> {
    if let Some(pos) = stack.iter().position(|n| n == name) {
        let mut cycle = stack[pos..].to_vec();
        cycle.push(name.to_string());
        return Err(GeneratorError::CircularDependency { cycle });
    }

    if visited.contains(name) {
        return Ok(());
    }

    let entry = entries.get(name).ok_or_else(|| GeneratorError::ServiceNotFound {
        name: name.to_string(),
    })?;

    stack.push(name.to_string());
    for dep in &entry.dependencies {
        visit(entries, dep, visited, stack, sorted)?;
    }
    stack.pop();

    visited.insert(name.to_string());
    sorted.push(name.to_string());
    Ok(())
}
