//! Top-level update check: fetch manifest, pick a profile, stream it.
//!
//! `OtaPull::check_for_update` never returns an error. Every path ends in
//! an `UpdateOutcome`, and failures are logged with their full cause chain
//! before being folded into one.

use core::time::Duration;

use log::{error, info, warn};

use crate::config::UpdatePolicy;
use crate::identity::DeviceIdentity;
use crate::manifest::{Manifest, ManifestProfile, MAX_MANIFEST_SIZE};
use crate::matcher::{match_profile, MatchResult};
use crate::network::http_config::{FIRMWARE_TIMEOUT, MANIFEST_TIMEOUT};
use crate::network::{read_body, HttpResponse, Transport};
use crate::ota::{stream, FlashUpdateSink, TransferOutcome};
use crate::outcome::UpdateOutcome;
use crate::trust::{self, TransportTrust};
use crate::version::{Lexicographic, VersionComparator};

/// Called with `(bytes_so_far, total)` after every chunk; must not block
pub type ProgressCallback = Box<dyn FnMut(u64, Option<u64>)>;

pub struct OtaPull<T: Transport> {
    transport: T,
    trust: TransportTrust,
    identity: DeviceIdentity,
    policy: UpdatePolicy,
    comparator: Box<dyn VersionComparator>,
    on_progress: Option<ProgressCallback>,
    candidate_version: Option<String>,
}

pub struct OtaPullBuilder<T: Transport> {
    transport: T,
    identity: DeviceIdentity,
    trust: TransportTrust,
    policy: UpdatePolicy,
    comparator: Box<dyn VersionComparator>,
    on_progress: Option<ProgressCallback>,
}

impl<T: Transport> OtaPullBuilder<T> {
    pub fn new(transport: T, identity: DeviceIdentity) -> Self {
        Self {
            transport,
            identity,
            trust: TransportTrust::default(),
            policy: UpdatePolicy::default(),
            comparator: Box::new(Lexicographic),
            on_progress: None,
        }
    }

    pub fn trust(mut self, trust: TransportTrust) -> Self {
        self.trust = trust;
        self
    }

    pub fn policy(mut self, policy: UpdatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the default lexicographic version ordering
    pub fn comparator(mut self, comparator: impl VersionComparator + 'static) -> Self {
        self.comparator = Box::new(comparator);
        self
    }

    pub fn on_progress(mut self, callback: impl FnMut(u64, Option<u64>) + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> OtaPull<T> {
        OtaPull {
            transport: self.transport,
            trust: self.trust,
            identity: self.identity,
            policy: self.policy,
            comparator: self.comparator,
            on_progress: self.on_progress,
            candidate_version: None,
        }
    }
}

impl<T: Transport> OtaPull<T> {
    pub fn builder(transport: T, identity: DeviceIdentity) -> OtaPullBuilder<T> {
        OtaPullBuilder::new(transport, identity)
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn policy(&self) -> &UpdatePolicy {
        &self.policy
    }

    /// Version string of the profile that decided the last check.
    ///
    /// That is the selected profile, or else the last profile that matched
    /// this device's board, id and config. Entries for other devices never
    /// set it, so it is `None` when nothing in the manifest fit this device
    /// rather than the version of whatever entry happened to come last.
    pub fn candidate_version(&self) -> Option<&str> {
        self.candidate_version.as_deref()
    }

    /// Check `manifest_url` with the configured identity and policy
    pub fn check_for_update<K>(&mut self, manifest_url: &str, sink: &mut K) -> UpdateOutcome
    where
        K: FlashUpdateSink + ?Sized,
    {
        let identity = self.identity.clone();
        let policy = self.policy;
        self.check_for_update_with(manifest_url, &identity, &policy, sink)
    }

    /// Check `manifest_url` for an explicit identity and policy
    pub fn check_for_update_with<K>(
        &mut self,
        manifest_url: &str,
        identity: &DeviceIdentity,
        policy: &UpdatePolicy,
        sink: &mut K,
    ) -> UpdateOutcome
    where
        K: FlashUpdateSink + ?Sized,
    {
        self.candidate_version = None;

        let outcome = match self.fetch_manifest(manifest_url) {
            Ok(manifest) => self.evaluate(&manifest, identity, policy, sink),
            Err(outcome) => outcome,
        };

        info!("OTA check finished: {} (code {})", outcome, outcome.code());
        outcome
    }

    fn evaluate<K>(
        &mut self,
        manifest: &Manifest,
        identity: &DeviceIdentity,
        policy: &UpdatePolicy,
        sink: &mut K,
    ) -> UpdateOutcome
    where
        K: FlashUpdateSink + ?Sized,
    {
        let report = match_profile(manifest, identity, policy, self.comparator.as_ref());
        self.candidate_version = report.candidate_version.map(str::to_string);

        match report.result {
            MatchResult::NoProfileFound => UpdateOutcome::NoUpdateProfileFound,
            MatchResult::NoUpdateApplicable => UpdateOutcome::NoUpdateAvailable,
            MatchResult::Selected(profile) if policy.dry_run => {
                info!(
                    "Update {:?} available at {}, not installing (dry run)",
                    profile.version_str(),
                    profile.binary_url
                );
                UpdateOutcome::UpdateAvailable
            }
            MatchResult::Selected(profile) => self.install(profile, policy, sink),
        }
    }

    fn install<K>(&mut self, profile: &ManifestProfile, policy: &UpdatePolicy, sink: &mut K) -> UpdateOutcome
    where
        K: FlashUpdateSink + ?Sized,
    {
        if profile.binary_url.is_empty() {
            error!("Selected profile {:?} has no URL", profile.version_str());
            return UpdateOutcome::JsonProblem;
        }

        info!(
            "Installing version {:?} from {}",
            profile.version_str(),
            profile.binary_url
        );

        let mut response = match self.get(&profile.binary_url, FIRMWARE_TIMEOUT) {
            Ok(response) => response,
            Err(outcome) => return outcome,
        };

        let mut no_progress = |_: u64, _: Option<u64>| {};
        let on_progress: &mut dyn FnMut(u64, Option<u64>) = match self.on_progress.as_mut() {
            Some(callback) => callback.as_mut(),
            None => &mut no_progress,
        };

        match stream(&mut response.body, response.content_length, sink, on_progress, policy) {
            TransferOutcome::Committed(_) => UpdateOutcome::UpdateOk,
            TransferOutcome::RestartRequested(_) => UpdateOutcome::RestartRequested,
            TransferOutcome::BeginFailed(_) => UpdateOutcome::OtaUpdateFail,
            TransferOutcome::WriteError(_) => UpdateOutcome::WriteError,
        }
    }

    fn fetch_manifest(&mut self, url: &str) -> Result<Manifest, UpdateOutcome> {
        let mut response = self.get(url, MANIFEST_TIMEOUT)?;

        let body = match read_body(&mut response.body, MAX_MANIFEST_SIZE) {
            Ok(Some(body)) => body,
            Ok(None) => {
                warn!("Manifest larger than {} bytes", MAX_MANIFEST_SIZE);
                return Err(UpdateOutcome::JsonProblem);
            }
            Err(e) => {
                warn!("Manifest read failed: {:#}", e);
                return Err(UpdateOutcome::JsonProblem);
            }
        };

        Manifest::parse(&body).map_err(|e| {
            warn!("Manifest parse failed: {}", e);
            UpdateOutcome::JsonProblem
        })
    }

    /// Trust setup, request and status classification shared by both fetches
    fn get(&mut self, url: &str, timeout: Duration) -> Result<HttpResponse<T::Body>, UpdateOutcome> {
        let handle = trust::configure_for_url(&self.trust, url).map_err(|e| {
            error!("Refusing to fetch {}: {}", url, e);
            UpdateOutcome::HttpFailed
        })?;

        let response = self.transport.get(url, &handle, timeout).map_err(|e| {
            warn!("GET {} failed: {:#}", url, e);
            UpdateOutcome::HttpFailed
        })?;

        info!("Got HTTP response: {}", response.status);
        if !response.is_success() {
            return Err(UpdateOutcome::from_http_status(i32::from(response.status)));
        }
        Ok(response)
    }
}

/// Carry out a requested restart; any other outcome is handed back unchanged.
pub fn restart_if_requested(outcome: UpdateOutcome) -> UpdateOutcome {
    if outcome == UpdateOutcome::RestartRequested {
        crate::system::restart();
    }
    outcome
}
