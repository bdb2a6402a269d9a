//! Vetting orchestration.
//!
//! A run moves through `Resolving → Evaluating → {Passed | Failed | Errored}`:
//! the build detail is fetched once, every configured check is spawned onto
//! its own task (bounded by the fan-out semaphore), outcomes land in one slot
//! per check, and a passed run hands off to the attestation publisher.
//!
//! Runs are fail-closed: any check error, cancellation or deadline makes the
//! run `Errored`, never `Passed` or `Failed`. By default every check runs to
//! completion so the report carries every error (`fail_fast = false`).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use imgvet_metadata::{BuildDetail, ImageRef, MetadataClient, PolicySetId};
use tokio::sync::{watch, Semaphore};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{info, instrument, Instrument};

use crate::attestation::AttestationPublisher;
use crate::cancel::CancelToken;
use crate::check::{Check, CheckContext, Collaborators, RunId};
use crate::config::VetConfig;
use crate::error::{CheckError, PublishError, VetError, VetResult};
use crate::metrics::METRICS;
use crate::obs::{emit_check_evaluated, emit_vet_finished, emit_vet_started, vet_span};
use crate::registry::CheckRegistry;
use crate::report::{aggregate, CheckOutcome, ErrorCause, Overall, Publication, VetReport};

/// Deadline plus external cancellation for one run.
struct Interrupt {
    cancel: CancelToken,
    deadline: Option<tokio::time::Instant>,
}

impl Interrupt {
    /// Resolves with the cause once the run must stop.
    async fn wait(&self) -> ErrorCause {
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = self.cancel.cancelled() => ErrorCause::Cancelled,
            _ = deadline => ErrorCause::DeadlineExceeded,
        }
    }

    fn triggered(&self) -> Option<ErrorCause> {
        if self.cancel.is_cancelled() {
            return Some(ErrorCause::Cancelled);
        }
        match self.deadline {
            Some(at) if tokio::time::Instant::now() >= at => Some(ErrorCause::DeadlineExceeded),
            _ => None,
        }
    }
}

/// Runs a fixed set of checks against images and publishes attestations.
///
/// Cheap to clone; all collaborators and checks are shared.
#[derive(Clone)]
pub struct Engine {
    metadata: Arc<dyn MetadataClient>,
    checks: Arc<[Arc<dyn Check>]>,
    policy_set: PolicySetId,
    publisher: Option<AttestationPublisher>,
    config: VetConfig,
}

impl Engine {
    /// Build an engine over an explicit check list.
    pub fn new(
        metadata: Arc<dyn MetadataClient>,
        checks: Vec<Arc<dyn Check>>,
        config: VetConfig,
    ) -> VetResult<Self> {
        config.validate()?;
        if checks.is_empty() {
            return Err(VetError::NoChecks);
        }
        let mut seen = HashSet::new();
        for check in &checks {
            if !seen.insert(check.name().to_string()) {
                return Err(VetError::DuplicateCheck(check.name().to_string()));
            }
        }
        let policy_set = PolicySetId::for_checks(checks.iter().map(|c| c.name()));

        Ok(Self {
            metadata,
            checks: checks.into(),
            policy_set,
            publisher: None,
            config,
        })
    }

    /// Build the checks named in `config.enabled_checks` from `registry`.
    pub fn from_registry(
        registry: &CheckRegistry,
        collaborators: &Collaborators,
        config: VetConfig,
    ) -> VetResult<Self> {
        let checks = registry.build(collaborators, &config)?;
        Self::new(Arc::clone(&collaborators.metadata), checks, config)
    }

    pub fn with_publisher(mut self, publisher: AttestationPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn policy_set(&self) -> &PolicySetId {
        &self.policy_set
    }

    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    pub fn config(&self) -> &VetConfig {
        &self.config
    }

    /// Vet one image with no external cancellation.
    pub async fn vet(&self, image: &ImageRef) -> VetReport {
        self.vet_with_cancel(image, CancelToken::never()).await
    }

    /// Vet one image; `cancel` aborts in-flight collaborator calls and
    /// yields an `Errored(cancelled)` report.
    pub async fn vet_with_cancel(&self, image: &ImageRef, cancel: CancelToken) -> VetReport {
        let run_id = RunId::new();
        let span = vet_span(&run_id.0, &image.to_string());
        self.run(run_id, image, cancel).instrument(span).await
    }

    /// Vet several images concurrently, one task per image. Reports come
    /// back in input order.
    pub async fn vet_many(&self, images: Vec<ImageRef>) -> Vec<VetReport> {
        let handles: Vec<JoinHandle<VetReport>> = images
            .iter()
            .cloned()
            .map(|image| {
                let engine = self.clone();
                tokio::spawn(async move { engine.vet(&image).await })
            })
            .collect();

        let joined = join_all(handles).await;
        METRICS.flush();
        joined
            .into_iter()
            .zip(images)
            .map(|(joined, image)| {
                joined.unwrap_or_else(|e| {
                    let now = Utc::now();
                    VetReport {
                        run_id: RunId::new(),
                        image,
                        policy_set: self.policy_set.clone(),
                        overall: Overall::Errored {
                            cause: ErrorCause::Aborted {
                                reason: e.to_string(),
                            },
                        },
                        build: None,
                        checks: Vec::new(),
                        publication: Publication::NotAttempted,
                        started_at: now,
                        finished_at: now,
                    }
                })
            })
            .collect()
    }

    async fn run(&self, run_id: RunId, image: &ImageRef, cancel: CancelToken) -> VetReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        METRICS.inc_vets_started();
        emit_vet_started(&run_id.0, &image.to_string(), self.checks.len());

        let interrupt = Interrupt {
            cancel,
            deadline: self
                .config
                .deadline()
                .map(|d| tokio::time::Instant::now() + d),
        };

        let (mut overall, build, checks) = self.evaluate(&run_id, image, &interrupt).await;

        // A pass is only final if the run was not interrupted in the meantime.
        if overall.is_passed() {
            if let Some(cause) = interrupt.triggered() {
                overall = Overall::Errored { cause };
            }
        }

        let mut report = VetReport {
            run_id,
            image: image.clone(),
            policy_set: self.policy_set.clone(),
            overall,
            build,
            checks,
            publication: Publication::NotAttempted,
            started_at,
            finished_at: Utc::now(),
        };

        if report.overall.is_passed() {
            match &self.publisher {
                Some(publisher) if self.config.publish => {
                    // The verdict stands; an interrupted write stays retriable.
                    let result = tokio::select! {
                        biased;
                        cause = interrupt.wait() => Err(PublishError::Interrupted(cause)),
                        result = publisher.publish(&report) => result,
                    };
                    publisher.record(&mut report, result);
                }
                _ => report.publication = Publication::Disabled,
            }
        }

        match &report.overall {
            Overall::Passed => METRICS.inc_vets_passed(),
            Overall::Failed { .. } => METRICS.inc_vets_failed(),
            Overall::Errored { .. } => METRICS.inc_vets_errored(),
        }
        emit_vet_finished(
            &report.run_id.0,
            report.overall.label(),
            clock.elapsed().as_millis() as u64,
            &report.summary(),
        );
        report
    }

    async fn evaluate(
        &self,
        run_id: &RunId,
        image: &ImageRef,
        interrupt: &Interrupt,
    ) -> (Overall, Option<BuildDetail>, Vec<CheckOutcome>) {
        let resolved = tokio::select! {
            biased;
            cause = interrupt.wait() => return (Overall::Errored { cause }, None, Vec::new()),
            resolved = self.metadata.get_build_detail(image) => resolved,
        };
        let build = match resolved {
            Ok(build) => build,
            Err(error) => {
                let cause = ErrorCause::BuildDetailUnavailable { error };
                return (Overall::Errored { cause }, None, Vec::new());
            }
        };
        info!(repository = %build.repository_url, commit = %build.commit, "build detail resolved");

        let ctx = Arc::new(CheckContext::new(run_id.clone(), image.clone(), build.clone()));
        match self.evaluate_checks(ctx, interrupt).await {
            Ok(outcomes) => (aggregate(&outcomes), Some(build), outcomes),
            Err((cause, outcomes)) => (Overall::Errored { cause }, Some(build), outcomes),
        }
    }

    /// Fan out every check and collect one outcome per check, in check order.
    ///
    /// Returns `Err` with whatever outcomes were collected when the run is
    /// interrupted; unfinished checks are aborted and reported as cancelled.
    #[instrument(skip_all, fields(checks = self.checks.len()))]
    async fn evaluate_checks(
        &self,
        ctx: Arc<CheckContext>,
        interrupt: &Interrupt,
    ) -> Result<Vec<CheckOutcome>, (ErrorCause, Vec<CheckOutcome>)> {
        let semaphore = Arc::new(Semaphore::new(self.config.fan_out()));
        let (trip_tx, trip_rx) = watch::channel(false);
        let trip = Arc::new(trip_tx);

        let handles: Vec<JoinHandle<CheckOutcome>> = self
            .checks
            .iter()
            .map(|check| {
                let task = CheckTask {
                    check: Arc::clone(check),
                    ctx: Arc::clone(&ctx),
                    semaphore: Arc::clone(&semaphore),
                    tripped: CancelToken::from_receiver(trip_rx.clone()),
                    trip: self.config.fail_fast.then(|| Arc::clone(&trip)),
                };
                tokio::spawn(task.run().in_current_span())
            })
            .collect();
        let _abort = AbortOnDrop(handles.iter().map(JoinHandle::abort_handle).collect());

        let mut outcomes = Vec::with_capacity(handles.len());
        let mut pending = handles.into_iter().zip(self.checks.iter());
        while let Some((mut handle, check)) = pending.next() {
            let joined = tokio::select! {
                biased;
                cause = interrupt.wait() => Err(cause),
                joined = &mut handle => Ok(joined),
            };
            match joined {
                Ok(joined) => outcomes.push(outcome_from_join(joined, check.name())),
                Err(cause) => {
                    // Checks that already finished keep their outcome.
                    for (handle, check) in std::iter::once((handle, check)).chain(pending) {
                        handle.abort();
                        outcomes.push(collect(handle, check.name()).await);
                    }
                    return Err((cause, outcomes));
                }
            }
        }
        Ok(outcomes)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("checks", &self.check_names())
            .field("policy_set", &self.policy_set)
            .field("publisher", &self.publisher)
            .field("config", &self.config)
            .finish()
    }
}

/// Resolve the build detail for `image`, then run `checks` against it.
///
/// Convenience entry point for callers that do not keep an [`Engine`].
pub async fn vet(
    metadata: Arc<dyn MetadataClient>,
    image: &ImageRef,
    checks: Vec<Arc<dyn Check>>,
    cancel: CancelToken,
) -> VetResult<VetReport> {
    let config = VetConfig {
        publish: false,
        ..VetConfig::default()
    };
    let engine = Engine::new(metadata, checks, config)?;
    Ok(engine.vet_with_cancel(image, cancel).await)
}

/// Everything one spawned check needs.
struct CheckTask {
    check: Arc<dyn Check>,
    ctx: Arc<CheckContext>,
    semaphore: Arc<Semaphore>,
    /// Fires when a sibling errored under fail-fast.
    tripped: CancelToken,
    /// Present only under fail-fast.
    trip: Option<Arc<watch::Sender<bool>>>,
}

impl CheckTask {
    async fn run(self) -> CheckOutcome {
        let name = self.check.name().to_string();
        let clock = Instant::now();

        let permit = tokio::select! {
            biased;
            _ = self.tripped.cancelled() => None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
        };

        let result = match permit {
            None => Err(CheckError::Cancelled),
            Some(_permit) => tokio::select! {
                biased;
                result = self.check.evaluate(&self.ctx) => result,
                _ = self.tripped.cancelled() => Err(CheckError::Cancelled),
            },
        };
        let duration_ms = clock.elapsed().as_millis() as u64;
        METRICS.inc_checks_evaluated();

        let outcome = match result {
            Ok(passed) => CheckOutcome::verdict(name, passed, duration_ms),
            Err(error) => {
                if error != CheckError::Cancelled {
                    if let Some(trip) = &self.trip {
                        trip.send_replace(true);
                    }
                }
                CheckOutcome::errored(name, error, duration_ms)
            }
        };
        emit_check_evaluated(
            &self.ctx.run_id.0,
            &outcome.name,
            outcome.passed,
            outcome.error.as_ref().map(|e| e as &dyn std::fmt::Display),
            duration_ms,
        );
        outcome
    }
}

/// Aborts spawned checks when the run future is dropped before joining them.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

async fn collect(handle: JoinHandle<CheckOutcome>, name: &str) -> CheckOutcome {
    outcome_from_join(handle.await, name)
}

fn outcome_from_join(
    joined: Result<CheckOutcome, tokio::task::JoinError>,
    name: &str,
) -> CheckOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => CheckOutcome::errored(name, CheckError::Cancelled, 0),
        Err(e) => CheckOutcome::errored(name, CheckError::Aborted(e.to_string()), 0),
    }
}
