//! In-memory fakes for collaborator traits (testing only)
//!
//! Provides `MemoryMetadataClient`, `MemoryRepositoryClient`, and `FakeSigner`
//! that satisfy the trait contracts without any external services. Each fake
//! supports failure injection and records call counts so tests can assert on
//! how the engine used it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::clients::*;
use crate::error::CollaboratorError;
use crate::image::ImageRef;
use crate::model::{Branch, BuildDetail, Commit, Occurrence, PolicySetId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Tracks concurrent calls and the highest concurrency observed.
#[derive(Debug, Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlightGuard<'a>(&'a InFlight);

impl InFlight {
    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MemoryMetadataClient
// ---------------------------------------------------------------------------

/// In-memory metadata service keyed by image digest.
///
/// Occurrences are stored per (digest, policy set). Publishing for a key
/// that already holds an occurrence keeps the original record.
#[derive(Debug, Default)]
pub struct MemoryMetadataClient {
    build_details: Mutex<HashMap<String, BuildDetail>>,
    occurrences: Mutex<HashMap<(String, PolicySetId), Occurrence>>,
    build_detail_error: Mutex<Option<CollaboratorError>>,
    lookup_error: Mutex<Option<CollaboratorError>>,
    hang_lookups: AtomicBool,
    publish_failures_remaining: AtomicUsize,
    build_detail_calls: AtomicUsize,
    publish_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
}

impl MemoryMetadataClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert_build_detail`](Self::insert_build_detail).
    pub fn with_build_detail(self, image: &ImageRef, detail: BuildDetail) -> Self {
        self.insert_build_detail(image, detail);
        self
    }

    pub fn insert_build_detail(&self, image: &ImageRef, detail: BuildDetail) {
        lock(&self.build_details).insert(image.digest().to_string(), detail);
    }

    /// Make every `get_build_detail` call fail with `err` (or succeed again
    /// when `None`).
    pub fn fail_build_detail(&self, err: Option<CollaboratorError>) {
        *lock(&self.build_detail_error) = err;
    }

    /// Make every `get_occurrence` call fail with `err`.
    pub fn fail_lookups(&self, err: Option<CollaboratorError>) {
        *lock(&self.lookup_error) = err;
    }

    /// Make every subsequent occurrence lookup wait forever.
    pub fn hang_lookups(&self, hang: bool) {
        self.hang_lookups.store(hang, Ordering::SeqCst);
    }

    /// Fail the next `count` publish calls with an `Unavailable` error.
    pub fn fail_next_publishes(&self, count: usize) {
        self.publish_failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn build_detail_calls(&self) -> usize {
        self.build_detail_calls.load(Ordering::SeqCst)
    }

    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    /// Number of occurrences currently stored for `image`, across policy sets.
    pub fn occurrence_count(&self, image: &ImageRef) -> usize {
        lock(&self.occurrences)
            .keys()
            .filter(|(digest, _)| digest == image.digest())
            .count()
    }

    pub fn total_occurrences(&self) -> usize {
        lock(&self.occurrences).len()
    }
}

#[async_trait]
impl MetadataClient for MemoryMetadataClient {
    async fn get_build_detail(&self, image: &ImageRef) -> ClientResult<BuildDetail> {
        self.build_detail_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = lock(&self.build_detail_error).clone() {
            return Err(err);
        }
        lock(&self.build_details)
            .get(image.digest())
            .cloned()
            .ok_or_else(|| CollaboratorError::not_found("build detail", image.digest()))
    }

    async fn publish_occurrence(
        &self,
        image: &ImageRef,
        policy_set: &PolicySetId,
        signed_payload: Vec<u8>,
    ) -> ClientResult<()> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .publish_failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            debug!(image = %image, policy_set = %policy_set, "injected publish failure");
            return Err(CollaboratorError::unavailable(
                "metadata",
                "injected publish failure",
            ));
        }

        let mut occurrences = lock(&self.occurrences);
        let key = (image.digest().to_string(), policy_set.clone());
        if occurrences.contains_key(&key) {
            debug!(image = %image, policy_set = %policy_set, "occurrence exists, keeping original");
            return Ok(());
        }
        occurrences.insert(
            key,
            Occurrence {
                subject: image.clone(),
                policy_set: policy_set.clone(),
                signed_payload,
                created_at: Utc::now(),
            },
        );
        debug!(image = %image, policy_set = %policy_set, "occurrence stored");
        Ok(())
    }

    async fn get_occurrence(
        &self,
        image: &ImageRef,
        policy_set: &PolicySetId,
    ) -> ClientResult<Option<Occurrence>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_lookups.load(Ordering::SeqCst) {
            debug!(image = %image, "occurrence lookup hanging");
            std::future::pending::<()>().await;
        }
        if let Some(err) = lock(&self.lookup_error).clone() {
            return Err(err);
        }
        let occurrences = lock(&self.occurrences);
        Ok(occurrences
            .get(&(image.digest().to_string(), policy_set.clone()))
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryRepositoryClient
// ---------------------------------------------------------------------------

/// In-memory source-control provider.
///
/// Commits are keyed by build detail; default branches by repository URL.
/// An optional latency is applied to every call, and `hang` makes calls
/// never complete (for cancellation tests).
#[derive(Debug, Default)]
pub struct MemoryRepositoryClient {
    commits: Mutex<HashMap<BuildDetail, Commit>>,
    branches: Mutex<HashMap<String, Branch>>,
    commit_error: Mutex<Option<CollaboratorError>>,
    branch_error: Mutex<Option<CollaboratorError>>,
    latency: Mutex<Option<Duration>>,
    hang: AtomicBool,
    commit_calls: AtomicUsize,
    branch_calls: AtomicUsize,
    in_flight: InFlight,
}

impl MemoryRepositoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_commit(self, build: &BuildDetail, commit: Commit) -> Self {
        self.insert_commit(build, commit);
        self
    }

    pub fn with_default_branch(self, build: &BuildDetail, branch: Branch) -> Self {
        self.insert_default_branch(build, branch);
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *lock(&self.latency) = Some(latency);
        self
    }

    pub fn insert_commit(&self, build: &BuildDetail, commit: Commit) {
        lock(&self.commits).insert(build.clone(), commit);
    }

    pub fn insert_default_branch(&self, build: &BuildDetail, branch: Branch) {
        lock(&self.branches).insert(build.repository_url.clone(), branch);
    }

    pub fn fail_commits(&self, err: Option<CollaboratorError>) {
        *lock(&self.commit_error) = err;
    }

    pub fn fail_branches(&self, err: Option<CollaboratorError>) {
        *lock(&self.branch_error) = err;
    }

    /// Make every subsequent call wait forever.
    pub fn hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn commit_calls(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }

    pub fn branch_calls(&self) -> usize {
        self.branch_calls.load(Ordering::SeqCst)
    }

    /// Calls currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.current.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were executing at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.in_flight.peak.load(Ordering::SeqCst)
    }

    async fn simulate_network(&self) {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RepositoryClient for MemoryRepositoryClient {
    async fn get_commit(&self, build: &BuildDetail) -> ClientResult<Commit> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.in_flight.enter();
        self.simulate_network().await;

        if let Some(err) = lock(&self.commit_error).clone() {
            return Err(err);
        }
        lock(&self.commits)
            .get(build)
            .cloned()
            .ok_or_else(|| CollaboratorError::not_found("commit", &build.commit))
    }

    async fn get_default_branch(&self, build: &BuildDetail) -> ClientResult<Branch> {
        self.branch_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.in_flight.enter();
        self.simulate_network().await;

        if let Some(err) = lock(&self.branch_error).clone() {
            return Err(err);
        }
        lock(&self.branches)
            .get(&build.repository_url)
            .cloned()
            .ok_or_else(|| CollaboratorError::not_found("default branch", &build.repository_url))
    }
}

// ---------------------------------------------------------------------------
// FakeSigner
// ---------------------------------------------------------------------------

/// Deterministic stand-in for a real signer: the "signature" is
/// `sha256(key_id || payload)`. Not a cryptographic signature.
#[derive(Debug)]
pub struct FakeSigner {
    key_id: String,
    error: Mutex<Option<CollaboratorError>>,
    empty_signatures: AtomicBool,
    sign_calls: AtomicUsize,
}

impl FakeSigner {
    pub fn new(key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            error: Mutex::new(None),
            empty_signatures: AtomicBool::new(false),
            sign_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_with(&self, err: Option<CollaboratorError>) {
        *lock(&self.error) = err;
    }

    /// Return zero-length signatures.
    pub fn return_empty(&self, empty: bool) {
        self.empty_signatures.store(empty, Ordering::SeqCst);
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    /// Signature this signer produces for `payload`.
    pub fn expected_signature(&self, payload: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.key_id.as_bytes());
        hasher.update(payload);
        hasher.finalize().to_vec()
    }
}

impl Default for FakeSigner {
    fn default() -> Self {
        Self::new("fake-key")
    }
}

#[async_trait]
impl PayloadSigner for FakeSigner {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn sign(&self, payload: &[u8]) -> ClientResult<Vec<u8>> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = lock(&self.error).clone() {
            return Err(err);
        }
        if self.empty_signatures.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(self.expected_signature(payload))
    }
}
