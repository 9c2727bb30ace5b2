//! Koyeb REST adapter.
//!
//! Talks to the public Koyeb API (`/v1/apps`, `/v1/services`). Name filters
//! on that API are prefix matches, so results are filtered on the exact name
//! before being returned.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::client::{FleetClient, ServiceSpec};
use crate::error::FleetError;

/// Public Koyeb API endpoint.
pub const DEFAULT_API_URL: &str = "https://app.koyeb.com";

const PAGE_SIZE: usize = 100;

/// Koyeb API client.
#[derive(Clone)]
pub struct KoyebClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl KoyebClient {
    /// Create a new client authenticating with `token`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, FleetError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn list_services_page(
        &self,
        app_id: &str,
        name: Option<&str>,
        offset: usize,
    ) -> Result<ListServicesReply, FleetError> {
        let limit = PAGE_SIZE.to_string();
        let offset = offset.to_string();
        let mut query = vec![
            ("app_id", app_id),
            ("limit", limit.as_str()),
            ("offset", offset.as_str()),
        ];
        if let Some(name) = name {
            query.push(("name", name));
        }

        let response = self
            .client
            .get(self.url("/v1/services"))
            .bearer_auth(&self.token)
            .query(&query)
            .send()
            .await?;

        Ok(check(response, "list services").await?.json().await?)
    }
}

/// Map a non-success response to [`FleetError::Api`], keeping the body.
async fn check(
    response: reqwest::Response,
    operation: &str,
) -> Result<reqwest::Response, FleetError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!(status = %status, body = %body, operation, "Koyeb API call failed");
    Err(FleetError::Api {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl FleetClient for KoyebClient {
    async fn find_application(&self, name: &str) -> Result<Option<String>, FleetError> {
        debug!(app_name = name, "Looking up application");
        let response = self
            .client
            .get(self.url("/v1/apps"))
            .bearer_auth(&self.token)
            .query(&[("name", name)])
            .send()
            .await?;

        let reply: ListAppsReply = check(response, "list apps").await?.json().await?;
        Ok(reply
            .apps
            .into_iter()
            .find(|app| app.name == name)
            .map(|app| app.id))
    }

    async fn create_application(&self, name: &str) -> Result<String, FleetError> {
        let response = self
            .client
            .post(self.url("/v1/apps"))
            .bearer_auth(&self.token)
            .json(&CreateAppRequest { name })
            .send()
            .await?;

        let reply: CreateAppReply = check(response, "create app").await?.json().await?;
        reply
            .app
            .map(|app| app.id)
            .ok_or_else(|| FleetError::InvalidResponse("create app reply has no app".into()))
    }

    async fn list_services(&self, app_id: &str) -> Result<Vec<String>, FleetError> {
        let mut ids = Vec::new();
        loop {
            let page = self.list_services_page(app_id, None, ids.len()).await?;
            let count = page.services.len();
            ids.extend(page.services.into_iter().map(|svc| svc.id));
            if !page.has_next || count == 0 {
                break;
            }
        }
        debug!(app_id, count = ids.len(), "Listed services");
        Ok(ids)
    }

    async fn find_service(&self, app_id: &str, name: &str) -> Result<Option<String>, FleetError> {
        let mut offset = 0;
        loop {
            let page = self.list_services_page(app_id, Some(name), offset).await?;
            let count = page.services.len();
            if let Some(svc) = page.services.into_iter().find(|svc| svc.name == name) {
                return Ok(Some(svc.id));
            }
            offset += count;
            if !page.has_next || count == 0 {
                return Ok(None);
            }
        }
    }

    async fn create_service(&self, spec: &ServiceSpec) -> Result<String, FleetError> {
        let request = CreateServiceRequest::from_spec(spec);
        let response = self
            .client
            .post(self.url("/v1/services"))
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;

        let reply: CreateServiceReply = check(response, "create service").await?.json().await?;
        reply
            .service
            .map(|svc| svc.id)
            .ok_or_else(|| FleetError::InvalidResponse("create service reply has no service".into()))
    }

    async fn delete_service(&self, service_id: &str) -> Result<bool, FleetError> {
        let response = self
            .client
            .delete(self.url(&format!("/v1/services/{service_id}")))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(service_id, "Service already deleted");
            return Ok(false);
        }
        check(response, "delete service").await?;
        Ok(true)
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct AppRef {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ListAppsReply {
    #[serde(default)]
    apps: Vec<AppRef>,
}

#[derive(Debug, Serialize)]
struct CreateAppRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateAppReply {
    app: Option<AppRef>,
}

#[derive(Debug, Deserialize)]
struct ServiceRef {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ListServicesReply {
    #[serde(default)]
    services: Vec<ServiceRef>,
    #[serde(default)]
    has_next: bool,
}

#[derive(Debug, Deserialize)]
struct CreateServiceReply {
    service: Option<ServiceRef>,
}

#[derive(Debug, Serialize)]
struct CreateServiceRequest<'a> {
    app_id: &'a str,
    definition: DeploymentDefinition<'a>,
}

#[derive(Debug, Serialize)]
struct DeploymentDefinition<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    docker: DockerSource<'a>,
    regions: Vec<&'a str>,
    instance_types: Vec<InstanceType<'a>>,
    env: Vec<EnvEntry<'a>>,
    scalings: Vec<ScalingEntry>,
}

#[derive(Debug, Serialize)]
struct DockerSource<'a> {
    image: &'a str,
    privileged: bool,
}

#[derive(Debug, Serialize)]
struct InstanceType<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    scopes: Vec<String>,
}

#[derive(Debug, Serialize)]
struct EnvEntry<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct ScalingEntry {
    min: u32,
    max: u32,
    scopes: Vec<String>,
}

impl<'a> CreateServiceRequest<'a> {
    fn from_spec(spec: &'a ServiceSpec) -> Self {
        let scope = format!("region:{}", spec.region);
        Self {
            app_id: &spec.app_id,
            definition: DeploymentDefinition {
                name: &spec.name,
                kind: "WORKER",
                docker: DockerSource {
                    image: &spec.image,
                    privileged: spec.privileged,
                },
                regions: vec![&spec.region],
                instance_types: vec![InstanceType {
                    kind: &spec.instance_type,
                    scopes: vec![scope.clone()],
                }],
                env: spec
                    .env
                    .iter()
                    .map(|var| EnvEntry {
                        key: &var.key,
                        value: &var.value,
                    })
                    .collect(),
                scalings: vec![ScalingEntry {
                    min: spec.scaling.min,
                    max: spec.scaling.max,
                    scopes: vec![scope],
                }],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{EnvVar, Scaling};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> KoyebClient {
        KoyebClient::new(server.uri(), "tok").unwrap()
    }

    fn spec() -> ServiceSpec {
        ServiceSpec {
            app_id: "app-1".to_string(),
            name: "runner-fra-small".to_string(),
            image: "koyeb/github-runner".to_string(),
            privileged: true,
            region: "fra".to_string(),
            instance_type: "small".to_string(),
            scaling: Scaling::SINGLE,
            env: vec![EnvVar::new("REPO_URL", "https://github.com/acme/app")],
        }
    }

    #[tokio::test]
    async fn test_find_application_filters_exact_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/apps"))
            .and(query_param("name", "github-runner"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apps": [
                    {"id": "app-2", "name": "github-runner-old"},
                    {"id": "app-1", "name": "github-runner"}
                ]
            })))
            .mount(&server)
            .await;

        let found = client(&server).find_application("github-runner").await.unwrap();
        assert_eq!(found.as_deref(), Some("app-1"));
    }

    #[tokio::test]
    async fn test_find_application_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/apps"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"apps": []})))
            .mount(&server)
            .await;

        let found = client(&server).find_application("github-runner").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_upsert_application_creates_when_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/apps"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"apps": []})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/apps"))
            .and(body_json(json!({"name": "github-runner"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"app": {"id": "app-9", "name": "github-runner"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (app_id, created) = client(&server)
            .upsert_application("github-runner")
            .await
            .unwrap();
        assert_eq!(app_id, "app-9");
        assert!(created);
    }

    #[tokio::test]
    async fn test_list_services_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/services"))
            .and(query_param("app_id", "app-1"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "services": [{"id": "svc-1", "name": "runner-fra-small"}],
                "has_next": true
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/services"))
            .and(query_param("offset", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "services": [{"id": "svc-2", "name": "runner-was-nano"}],
                "has_next": false
            })))
            .mount(&server)
            .await;

        let ids = client(&server).list_services("app-1").await.unwrap();
        assert_eq!(ids, vec!["svc-1".to_string(), "svc-2".to_string()]);
    }

    #[tokio::test]
    async fn test_find_service_filters_exact_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/services"))
            .and(query_param("name", "runner-fra-small"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "services": [{"id": "svc-7", "name": "runner-fra-smallish"}]
            })))
            .mount(&server)
            .await;

        let found = client(&server)
            .find_service("app-1", "runner-fra-small")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_find_service_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/services"))
            .and(query_param("name", "runner-fra-small"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "services": [{"id": "svc-7", "name": "runner-fra-smallish"}],
                "has_next": true
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/services"))
            .and(query_param("name", "runner-fra-small"))
            .and(query_param("offset", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "services": [{"id": "svc-8", "name": "runner-fra-small"}],
                "has_next": false
            })))
            .mount(&server)
            .await;

        let found = client(&server)
            .find_service("app-1", "runner-fra-small")
            .await
            .unwrap();
        assert_eq!(found.as_deref(), Some("svc-8"));
    }

    #[tokio::test]
    async fn test_create_service_wire_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/services"))
            .and(body_json(json!({
                "app_id": "app-1",
                "definition": {
                    "name": "runner-fra-small",
                    "type": "WORKER",
                    "docker": {"image": "koyeb/github-runner", "privileged": true},
                    "regions": ["fra"],
                    "instance_types": [{"type": "small", "scopes": ["region:fra"]}],
                    "env": [{"key": "REPO_URL", "value": "https://github.com/acme/app"}],
                    "scalings": [{"min": 1, "max": 1, "scopes": ["region:fra"]}]
                }
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"service": {"id": "svc-1"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server).create_service(&spec()).await.unwrap();
        assert_eq!(id, "svc-1");
    }

    #[tokio::test]
    async fn test_create_service_surfaces_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/services"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid instance type"))
            .mount(&server)
            .await;

        let err = client(&server).create_service(&spec()).await.unwrap_err();
        match err {
            FleetError::Api { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "invalid instance type");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[rstest::rstest]
    #[case(200, Some(true))]
    #[case(404, Some(false))]
    #[case(500, None)]
    #[tokio::test]
    async fn test_delete_service(#[case] status: u16, #[case] expected: Option<bool>) {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/services/svc-1"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({})))
            .mount(&server)
            .await;

        let result = client(&server).delete_service("svc-1").await;
        assert_eq!(result.ok(), expected);
    }
}
