//! Fleet client interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FleetError;

/// Environment variable set on a provisioned service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Replica bounds, scoped to the service's region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scaling {
    pub min: u32,
    pub max: u32,
}

impl Scaling {
    /// Exactly one replica.
    pub const SINGLE: Scaling = Scaling { min: 1, max: 1 };
}

/// Desired configuration of a runner service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Owning application.
    pub app_id: String,
    /// Service name, unique within the application.
    pub name: String,
    /// Container image reference.
    pub image: String,
    /// Run the container privileged.
    pub privileged: bool,
    pub region: String,
    pub instance_type: String,
    pub scaling: Scaling,
    pub env: Vec<EnvVar>,
}

impl ServiceSpec {
    /// Look up an environment variable by key.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|var| var.key == key)
            .map(|var| var.value.as_str())
    }
}

/// Capability to manage applications and services on the fleet backend.
///
/// Every lookup returns `None` for an absent resource rather than an error.
#[async_trait]
pub trait FleetClient: Send + Sync {
    /// Find an application by exact name.
    async fn find_application(&self, name: &str) -> Result<Option<String>, FleetError>;

    /// Create an application and return its id.
    async fn create_application(&self, name: &str) -> Result<String, FleetError>;

    /// List the ids of every service in an application.
    async fn list_services(&self, app_id: &str) -> Result<Vec<String>, FleetError>;

    /// Find a service by exact name within an application.
    async fn find_service(&self, app_id: &str, name: &str) -> Result<Option<String>, FleetError>;

    /// Create a service and return its id.
    async fn create_service(&self, spec: &ServiceSpec) -> Result<String, FleetError>;

    /// Delete a service.
    ///
    /// Returns `Ok(false)` when the service was already absent.
    async fn delete_service(&self, service_id: &str) -> Result<bool, FleetError>;

    /// Find the application by name, creating it if needed.
    ///
    /// Returns the application id and whether it was created by this call.
    async fn upsert_application(&self, name: &str) -> Result<(String, bool), FleetError> {
        if let Some(app_id) = self.find_application(name).await? {
            return Ok((app_id, false));
        }
        let app_id = self.create_application(name).await?;
        Ok((app_id, true))
    }
}
