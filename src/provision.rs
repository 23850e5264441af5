//! Creation of cluster resources that may be left over from a previous run.
//!
//! A create that fails because the objects already exist means an earlier run did not finish its
//! cleanup. Stale instances are purged, the blocking finalizer is cleared and the objects are
//! deleted before trying again, up to a fixed number of attempts separated by a fixed delay.
//!
//! ```text
//! Idle -> Attempting(i) -> Succeeded
//!                       -> Conflict -> Attempting(i + 1)
//!                       -> FatalError
//!                       -> ExhaustedConflict (i == max_attempts - 1)
//! ```

use std::thread::sleep;
use std::time::Duration;

use duration_str::deserialize_duration;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::k8s::K8sError;
use crate::manifests::{ManifestAction, ManifestResource};

pub const DEFAULT_MAX_ATTEMPTS: usize = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    #[serde(deserialize_with = "deserialize_duration")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }
}

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("only resources to create can be provisioned, got {0:?}")]
    UnsupportedAction(ManifestAction),

    #[error("creating resources: `{0}`")]
    Create(#[source] K8sError),

    #[error("resources still exist after {attempts} attempts: `{source}`")]
    ExhaustedRetries {
        attempts: usize,
        #[source]
        source: K8sError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Conflict,
    OtherError,
}

/// Record of a single create attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionAttempt {
    pub index: usize,
    pub outcome: AttemptOutcome,
    pub error: Option<String>,
}

impl ProvisionAttempt {
    fn new(index: usize, result: &Result<(), K8sError>) -> Self {
        let (outcome, error) = match result {
            Ok(()) => (AttemptOutcome::Success, None),
            Err(err) if err.is_already_exists() => {
                (AttemptOutcome::Conflict, Some(err.to_string()))
            }
            Err(err) => (AttemptOutcome::OtherError, Some(err.to_string())),
        };
        Self {
            index,
            outcome,
            error,
        }
    }
}

/// Cleanup steps run after a conflict. None of them can fail provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStep {
    PurgeStale,
    RemoveFinalizers,
    Delete,
}

/// Operations on the cluster needed to create resources and clear stale ones.
#[cfg_attr(test, mockall::automock)]
pub trait ClusterManager {
    fn create(&self, manifest: &str) -> Result<(), K8sError>;
    fn delete(&self, manifest: &str) -> Result<(), K8sError>;
    fn patch_remove_finalizers(&self, kind: &str, name: &str) -> Result<(), K8sError>;
    /// Removes every stale instance left by previous runs. Must be a no-op when nothing is left.
    fn purge_stale(&self) -> Result<(), K8sError>;
}

/// Receives diagnostics that never change the provisioning outcome.
#[cfg_attr(test, mockall::automock)]
pub trait ProvisionEvents {
    fn attempt_finished(&self, attempt: &ProvisionAttempt);
    fn cleanup_failed(&self, step: CleanupStep, err: &K8sError);
}

/// Default sink, reports everything through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEvents;

impl ProvisionEvents for TracingEvents {
    fn attempt_finished(&self, attempt: &ProvisionAttempt) {
        match attempt.outcome {
            AttemptOutcome::Success => info!(attempt = attempt.index, "resources created"),
            AttemptOutcome::Conflict => warn!(
                attempt = attempt.index,
                "resources were not cleaned up from a previous run, deleting them to try again"
            ),
            AttemptOutcome::OtherError => warn!(
                attempt = attempt.index,
                error = attempt.error.as_deref().unwrap_or_default(),
                "creating resources failed"
            ),
        }
    }

    fn cleanup_failed(&self, step: CleanupStep, err: &K8sError) {
        match step {
            CleanupStep::PurgeStale => warn!("could not purge stale resources: {err}"),
            CleanupStep::RemoveFinalizers => warn!("could not remove finalizer: {err}"),
            CleanupStep::Delete => info!("deleting the resources returned an error: {err}"),
        }
    }
}

/// Object whose finalizer blocks the removal of the provisioned resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizerTarget {
    pub kind: String,
    pub name: String,
}

impl FinalizerTarget {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

pub struct Provisioner<'a, C, S = TracingEvents> {
    cluster: &'a C,
    events: S,
    finalizer_target: Option<FinalizerTarget>,
}

impl<'a, C: ClusterManager> Provisioner<'a, C> {
    pub fn new(cluster: &'a C) -> Self {
        Self {
            cluster,
            events: TracingEvents,
            finalizer_target: None,
        }
    }
}

impl<'a, C: ClusterManager, S: ProvisionEvents> Provisioner<'a, C, S> {
    pub fn with_events<T: ProvisionEvents>(self, events: T) -> Provisioner<'a, C, T> {
        Provisioner {
            cluster: self.cluster,
            events,
            finalizer_target: self.finalizer_target,
        }
    }

    pub fn with_finalizer_target(mut self, target: FinalizerTarget) -> Self {
        self.finalizer_target = Some(target);
        self
    }

    /// Creates `resource`, clearing stale copies on conflict as configured by `policy`. Only
    /// resources whose action is [ManifestAction::Create] are accepted.
    pub fn provision(
        &self,
        resource: &ManifestResource,
        policy: &RetryPolicy,
    ) -> Result<(), ProvisionError> {
        self.provision_with_sleep(resource, policy, sleep)
    }

    /// Same as [Provisioner::provision], waiting between attempts with `sleep_func`.
    pub fn provision_with_sleep<F>(
        &self,
        resource: &ManifestResource,
        policy: &RetryPolicy,
        mut sleep_func: F,
    ) -> Result<(), ProvisionError>
    where
        F: FnMut(Duration),
    {
        if resource.action() != ManifestAction::Create {
            return Err(ProvisionError::UnsupportedAction(resource.action()));
        }

        let attempts = policy.attempts();
        let mut index = 0;

        loop {
            if index > 0 {
                info!("waiting {:?} before attempt {}/{attempts}", policy.delay, index + 1);
                sleep_func(policy.delay);
            }

            let result = self.cluster.create(resource.content());
            self.events
                .attempt_finished(&ProvisionAttempt::new(index, &result));

            match result {
                Ok(()) => return Ok(()),
                Err(err) if !err.is_already_exists() => return Err(ProvisionError::Create(err)),
                Err(conflict) => {
                    self.clear_stale(resource);
                    index += 1;
                    if index >= attempts {
                        return Err(ProvisionError::ExhaustedRetries {
                            attempts,
                            source: conflict,
                        });
                    }
                }
            }
        }
    }

    fn clear_stale(&self, resource: &ManifestResource) {
        if let Err(err) = self.cluster.purge_stale() {
            self.events.cleanup_failed(CleanupStep::PurgeStale, &err);
        }

        if let Some(target) = &self.finalizer_target {
            if let Err(err) = self
                .cluster
                .patch_remove_finalizers(&target.kind, &target.name)
            {
                self.events.cleanup_failed(CleanupStep::RemoveFinalizers, &err);
            }
        }

        if let Err(err) = self.cluster.delete(resource.content()) {
            self.events.cleanup_failed(CleanupStep::Delete, &err);
        }
    }
}
