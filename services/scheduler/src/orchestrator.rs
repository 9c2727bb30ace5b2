//! Runner lifecycle orchestration.
//!
//! Turns each workflow job event into at most one change on the fleet:
//!
//! - no target label: nothing to do
//! - runner exists: refresh its TTL (or tear it down on `completed` when
//!   configured to)
//! - no runner and `queued`: create one and start tracking it
//! - no runner otherwise: nothing to do
//!
//! The lookup-then-create sequence is not serialized across requests. Two
//! simultaneous `queued` events for one target can both create a runner;
//! the reaper eventually removes the spare.

use std::sync::Arc;

use runner_events::{route, Target, WorkflowJobEvent};
use runner_fleet::{EnvVar, FleetClient, FleetError, Scaling, ServiceSpec};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use crate::config::Config;
use crate::reaper::Reaper;

/// Application grouping every runner service.
pub const RUNNERS_APP_NAME: &str = "github-runner";

/// Errors raised while handling an event.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to {step} for runner {target}: {source}")]
    Fleet {
        step: &'static str,
        target: Target,
        #[source]
        source: FleetError,
    },

    #[error("failed to load existing runners: {0}")]
    Bootstrap(#[source] FleetError),
}

impl SchedulerError {
    fn fleet<'a>(step: &'static str, target: &'a Target) -> impl FnOnce(FleetError) -> Self + 'a {
        move |source| SchedulerError::Fleet {
            step,
            target: target.clone(),
            source,
        }
    }
}

/// What handling an event did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// No label targets this scheduler.
    Ignored,
    /// No runner for the target, and the action does not call for one.
    Skipped { target: Target },
    /// An existing runner had its TTL refreshed.
    Refreshed { target: Target, service_id: String },
    /// A new runner was created.
    Created { target: Target, service_id: String },
    /// An existing runner was deleted on `completed`.
    TornDown {
        target: Target,
        service_id: String,
        deleted: bool,
    },
}

/// Provisions and refreshes runners in response to workflow job events.
pub struct Scheduler {
    config: Arc<Config>,
    fleet: Arc<dyn FleetClient>,
    reaper: Reaper,
}

impl Scheduler {
    pub fn new(config: Arc<Config>, fleet: Arc<dyn FleetClient>, reaper: Reaper) -> Self {
        Self {
            config,
            fleet,
            reaper,
        }
    }

    /// Build a scheduler whose reaper tracks every runner that already exists.
    ///
    /// Recovered runners start a fresh TTL.
    pub async fn bootstrap(
        config: Arc<Config>,
        fleet: Arc<dyn FleetClient>,
    ) -> Result<Self, SchedulerError> {
        let reaper = Reaper::new(
            Arc::clone(&fleet),
            config.runners_ttl,
            config.reaper_poll_interval,
        );

        let existing = match fleet
            .find_application(RUNNERS_APP_NAME)
            .await
            .map_err(SchedulerError::Bootstrap)?
        {
            Some(app_id) => fleet
                .list_services(&app_id)
                .await
                .map_err(SchedulerError::Bootstrap)?,
            None => Vec::new(),
        };

        for service_id in &existing {
            reaper.track(service_id);
        }
        info!(count = existing.len(), "Tracking existing runners");

        Ok(Self::new(config, fleet, reaper))
    }

    pub fn reaper(&self) -> &Reaper {
        &self.reaper
    }

    /// Handle one workflow job event.
    #[instrument(
        skip_all,
        fields(
            action = %event.action,
            run_id = event.workflow_job.run_id,
            workflow = %event.workflow_job.workflow_name,
        )
    )]
    pub async fn handle(&self, event: &WorkflowJobEvent) -> Result<Outcome, SchedulerError> {
        let Some(target) = route(event.labels(), &self.config.label_prefix) else {
            info!("The event does not target this scheduler, ignoring");
            return Ok(Outcome::Ignored);
        };
        if !target.is_complete() {
            info!(runner = %target, "The target label has an empty region or instance type, ignoring");
            return Ok(Outcome::Ignored);
        }

        let (app_id, created) = self
            .fleet
            .upsert_application(RUNNERS_APP_NAME)
            .await
            .map_err(SchedulerError::fleet("ensure application", &target))?;
        if created {
            info!(app_id = %app_id, "Created the runners application");
        }

        let service_name = target.service_name();
        let existing = self
            .fleet
            .find_service(&app_id, &service_name)
            .await
            .map_err(SchedulerError::fleet("look up runner", &target))?;

        if let Some(service_id) = existing {
            if event.action.is_completed() && self.config.teardown_on_completed {
                return self.tear_down(target, service_id).await;
            }
            info!(
                service_id = %service_id,
                runner = %target,
                ttl_secs = self.reaper.ttl().as_secs(),
                "Runner exists, refreshing its TTL"
            );
            self.reaper.track(&service_id);
            return Ok(Outcome::Refreshed { target, service_id });
        }

        if !event.action.is_queued() {
            info!(runner = %target, "No runner and the action is not \"queued\", ignoring");
            return Ok(Outcome::Skipped { target });
        }

        info!(runner = %target, "No runner, starting a new one");
        let spec = self.service_spec(&app_id, &target, event);
        let service_id = self
            .fleet
            .create_service(&spec)
            .await
            .map_err(SchedulerError::fleet("create runner", &target))?;
        self.reaper.track(&service_id);
        info!(
            service_id = %service_id,
            runner = %target,
            ttl_secs = self.reaper.ttl().as_secs(),
            "Created runner"
        );

        Ok(Outcome::Created { target, service_id })
    }

    async fn tear_down(&self, target: Target, service_id: String) -> Result<Outcome, SchedulerError> {
        info!(service_id = %service_id, runner = %target, "Job completed, deleting runner");
        let deleted = self
            .fleet
            .delete_service(&service_id)
            .await
            .map_err(SchedulerError::fleet("delete runner", &target))?;
        self.reaper.forget(&service_id);

        Ok(Outcome::TornDown {
            target,
            service_id,
            deleted,
        })
    }

    /// Desired configuration of the runner serving `target`.
    pub fn service_spec(&self, app_id: &str, target: &Target, event: &WorkflowJobEvent) -> ServiceSpec {
        let config = &self.config;
        let mut env = vec![
            EnvVar::new("REPO_URL", config.mode.registration_url(&event.repository)),
            EnvVar::new("GITHUB_TOKEN", config.github_token.as_str()),
            EnvVar::new("RUNNER_LABELS", target.runner_label(&config.label_prefix)),
        ];
        if config.disable_docker_daemon {
            env.push(EnvVar::new("DISABLE_DOCKER_DAEMON", "true"));
        }

        ServiceSpec {
            app_id: app_id.to_string(),
            name: target.service_name(),
            image: config.runner_image.clone(),
            // Without a Docker daemon the container needs no privileges.
            privileged: !config.disable_docker_daemon,
            region: target.region.clone(),
            instance_type: target.instance_class.clone(),
            scaling: Scaling::SINGLE,
            env,
        }
    }
}
