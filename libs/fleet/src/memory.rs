//! In-memory fleet backend.
//!
//! Keeps applications and services in process and records every call, so
//! tests can assert on what the scheduler asked for. Failures can be
//! injected for delete and for the whole backend.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use crate::client::{FleetClient, ServiceSpec};
use crate::error::FleetError;

/// A call received by [`InMemoryFleet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetCall {
    FindApplication(String),
    CreateApplication(String),
    ListServices(String),
    FindService { app_id: String, name: String },
    CreateService(String),
    DeleteService(String),
}

#[derive(Default)]
struct State {
    next_id: u64,
    apps: BTreeMap<String, String>,
    services: BTreeMap<String, ServiceSpec>,
    calls: Vec<FleetCall>,
    failing_deletes: u32,
    unavailable: bool,
}

impl State {
    fn next_id(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{kind}-{:04}", self.next_id)
    }

    fn record(&mut self, call: FleetCall) -> Result<(), FleetError> {
        self.calls.push(call);
        if self.unavailable {
            return Err(FleetError::Unavailable("in-memory fleet marked unavailable".into()));
        }
        Ok(())
    }
}

/// Recording in-memory [`FleetClient`].
#[derive(Default)]
pub struct InMemoryFleet {
    state: Mutex<State>,
}

impl InMemoryFleet {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create an application directly, without recording a call.
    pub fn seed_application(&self, name: &str) -> String {
        let mut state = self.state();
        let id = state.next_id("app");
        state.apps.insert(id.clone(), name.to_string());
        id
    }

    /// Create a service directly, without recording a call.
    pub fn seed_service(&self, spec: ServiceSpec) -> String {
        let mut state = self.state();
        let id = state.next_id("svc");
        state.services.insert(id.clone(), spec);
        id
    }

    /// Remove a service behind the scheduler's back.
    pub fn remove_service(&self, service_id: &str) -> Option<ServiceSpec> {
        self.state().services.remove(service_id)
    }

    /// Make the next `count` deletes fail.
    pub fn fail_next_deletes(&self, count: u32) {
        self.state().failing_deletes = count;
    }

    /// Make every call fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    pub fn calls(&self) -> Vec<FleetCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    pub fn create_service_calls(&self) -> usize {
        self.count_calls(|call| matches!(call, FleetCall::CreateService(_)))
    }

    pub fn delete_service_calls(&self) -> usize {
        self.count_calls(|call| matches!(call, FleetCall::DeleteService(_)))
    }

    fn count_calls(&self, pred: impl Fn(&FleetCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| pred(call)).count()
    }

    pub fn service(&self, service_id: &str) -> Option<ServiceSpec> {
        self.state().services.get(service_id).cloned()
    }

    pub fn has_service(&self, service_id: &str) -> bool {
        self.state().services.contains_key(service_id)
    }

    /// Every live service, ordered by id.
    pub fn services(&self) -> Vec<(String, ServiceSpec)> {
        self.state()
            .services
            .iter()
            .map(|(id, spec)| (id.clone(), spec.clone()))
            .collect()
    }
}

#[async_trait]
impl FleetClient for InMemoryFleet {
    async fn find_application(&self, name: &str) -> Result<Option<String>, FleetError> {
        let mut state = self.state();
        state.record(FleetCall::FindApplication(name.to_string()))?;
        Ok(state
            .apps
            .iter()
            .find(|(_, app_name)| app_name.as_str() == name)
            .map(|(id, _)| id.clone()))
    }

    async fn create_application(&self, name: &str) -> Result<String, FleetError> {
        let mut state = self.state();
        state.record(FleetCall::CreateApplication(name.to_string()))?;
        let id = state.next_id("app");
        state.apps.insert(id.clone(), name.to_string());
        debug!(app_id = %id, app_name = name, "[MEMORY] Created application");
        Ok(id)
    }

    async fn list_services(&self, app_id: &str) -> Result<Vec<String>, FleetError> {
        let mut state = self.state();
        state.record(FleetCall::ListServices(app_id.to_string()))?;
        Ok(state
            .services
            .iter()
            .filter(|(_, spec)| spec.app_id == app_id)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn find_service(&self, app_id: &str, name: &str) -> Result<Option<String>, FleetError> {
        let mut state = self.state();
        state.record(FleetCall::FindService {
            app_id: app_id.to_string(),
            name: name.to_string(),
        })?;
        Ok(state
            .services
            .iter()
            .find(|(_, spec)| spec.app_id == app_id && spec.name == name)
            .map(|(id, _)| id.clone()))
    }

    async fn create_service(&self, spec: &ServiceSpec) -> Result<String, FleetError> {
        let mut state = self.state();
        state.record(FleetCall::CreateService(spec.name.clone()))?;
        let id = state.next_id("svc");
        state.services.insert(id.clone(), spec.clone());
        debug!(service_id = %id, service_name = %spec.name, "[MEMORY] Created service");
        Ok(id)
    }

    async fn delete_service(&self, service_id: &str) -> Result<bool, FleetError> {
        let mut state = self.state();
        state.record(FleetCall::DeleteService(service_id.to_string()))?;
        if state.failing_deletes > 0 {
            state.failing_deletes -= 1;
            return Err(FleetError::Unavailable(format!(
                "injected delete failure for {service_id}"
            )));
        }
        let removed = state.services.remove(service_id).is_some();
        debug!(service_id, removed, "[MEMORY] Deleted service");
        Ok(removed)
    }
}
