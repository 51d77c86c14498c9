use crate::settings::{LifetimeReference, Settings};

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use std::time::Duration;

const EVICTED_REASON: &str = "Evicted";

/// Source of the current time for expiry decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The parts of the configuration that decide whether a pod expired
#[derive(Clone, Copy, Debug)]
pub struct ExpiryPolicy<'a> {
    pub lifetime_annotation: &'a str,
    pub job_label: &'a str,
    pub reference: LifetimeReference,
    pub reap_evicted: bool,
}

impl<'a> From<&'a Settings> for ExpiryPolicy<'a> {
    fn from(settings: &'a Settings) -> Self {
        Self {
            lifetime_annotation: &settings.lifetime_annotation,
            job_label: &settings.job_label,
            reference: settings.lifetime_from,
            reap_evicted: settings.reap_evicted_pods,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// No lifetime annotation, the pod is not managed by the reaper
    Unmanaged,
    InvalidLifetime { value: String, error: String },
    MissingJobLabel,
    /// The reference timestamp is not recorded yet
    NotStarted,
    WithinLifetime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReapReason {
    Expired,
    Evicted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Skip(SkipReason),
    Reap { job_id: String, reason: ReapReason },
}

pub fn parse_lifetime(value: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(value.trim())
}

/// Decide whether `pod` should be reaped at `now`.
pub fn evaluate(pod: &Pod, now: DateTime<Utc>, policy: &ExpiryPolicy<'_>) -> Verdict {
    let Some(value) = pod.annotations().get(policy.lifetime_annotation) else {
        return Verdict::Skip(SkipReason::Unmanaged);
    };
    let lifetime = match parse_lifetime(value) {
        Ok(lifetime) => lifetime,
        Err(err) => {
            return Verdict::Skip(SkipReason::InvalidLifetime {
                value: value.clone(),
                error: err.to_string(),
            })
        }
    };
    let Some(job_id) = pod.labels().get(policy.job_label) else {
        return Verdict::Skip(SkipReason::MissingJobLabel);
    };

    let reference = match policy.reference {
        LifetimeReference::Creation => pod.metadata.creation_timestamp.as_ref(),
        LifetimeReference::StartTime => pod.status.as_ref().and_then(|s| s.start_time.as_ref()),
    };
    let Some(reference) = reference else {
        return Verdict::Skip(SkipReason::NotStarted);
    };

    let current_lifetime = now.signed_duration_since(reference.0);
    // a lifetime too large for chrono never expires
    let expired = chrono::Duration::from_std(lifetime).map_or(false, |lifetime| current_lifetime > lifetime);
    if expired {
        return Verdict::Reap {
            job_id: job_id.clone(),
            reason: ReapReason::Expired,
        };
    }

    if policy.reap_evicted && is_evicted(pod) {
        return Verdict::Reap {
            job_id: job_id.clone(),
            reason: ReapReason::Evicted,
        };
    }

    Verdict::Skip(SkipReason::WithinLifetime)
}

fn is_evicted(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.reason.as_deref())
        .map_or(false, |reason| reason.contains(EVICTED_REASON))
}
