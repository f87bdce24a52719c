//! Pod health classification and condition history aggregation
//!
//! Everything here is pure: the current time is passed in, nothing is read
//! from the cluster, and histories are returned as new values.
//!
//! A reconcile pass classifies every selected pod with [`classify`], folds
//! the classifications into one resource-level condition with [`rollup`],
//! and merges that condition into the stored history with
//! [`merge_condition`].

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::core::v1::Pod;

use crate::crd::{ComputeNodeCondition, ConditionStatus, ConditionType};

/// Lifecycle phase reported by a pod
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PodPhase {
    Unknown,
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl PodPhase {
    /// Parse the API phase string; an unset phase is not yet classified
    pub fn parse(phase: Option<&str>) -> Option<Self> {
        match phase? {
            "Pending" => Some(PodPhase::Pending),
            "Running" => Some(PodPhase::Running),
            "Succeeded" => Some(PodPhase::Succeeded),
            "Failed" => Some(PodPhase::Failed),
            "Unknown" => Some(PodPhase::Unknown),
            _ => None,
        }
    }
}

/// The subset of a pod's status the controller looks at
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodObservation {
    pub phase: Option<PodPhase>,
    pub scheduled: bool,
    pub initialized: bool,
    pub containers_ready: bool,
    pub ready: bool,
    /// Ready flag per container name
    pub container_ready: BTreeMap<String, bool>,
}

impl PodObservation {
    pub fn from_pod(pod: &Pod) -> Self {
        let mut obs = PodObservation::default();
        let Some(status) = pod.status.as_ref() else {
            return obs;
        };

        obs.phase = PodPhase::parse(status.phase.as_deref());

        for c in status.conditions.iter().flatten() {
            let is_true = c.status == "True";
            match c.type_.as_str() {
                "PodScheduled" => obs.scheduled |= is_true,
                "Initialized" => obs.initialized |= is_true,
                "ContainersReady" => obs.containers_ready |= is_true,
                "Ready" => obs.ready |= is_true,
                _ => {}
            }
        }

        for cs in status.container_statuses.iter().flatten() {
            obs.container_ready.insert(cs.name.clone(), cs.ready);
        }

        obs
    }

    /// Running, Ready, and the named container reports ready
    pub fn is_serving(&self, container: &str) -> bool {
        self.phase == Some(PodPhase::Running)
            && self.ready
            && self.container_ready.get(container).copied().unwrap_or(false)
    }
}

/// Classify one pod.
///
/// Terminal and unscheduled phases decide directly; otherwise the most
/// advanced true sub-condition wins. `None` means nothing is known yet.
pub fn classify(obs: &PodObservation) -> Option<ConditionType> {
    match obs.phase {
        Some(PodPhase::Unknown) => return Some(ConditionType::Unknown),
        Some(PodPhase::Pending) => return Some(ConditionType::Pending),
        Some(PodPhase::Failed) => return Some(ConditionType::Failed),
        _ => {}
    }

    if obs.ready {
        Some(ConditionType::Ready)
    } else if obs.containers_ready {
        Some(ConditionType::Started)
    } else if obs.initialized {
        Some(ConditionType::Initialized)
    } else if obs.scheduled {
        Some(ConditionType::Deployed)
    } else {
        None
    }
}

/// Classify a pod straight from its API object
pub fn classify_pod(pod: &Pod) -> Option<ConditionType> {
    classify(&PodObservation::from_pod(pod))
}

/// Format a timestamp the way conditions store it
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl ComputeNodeCondition {
    /// An asserted condition of the given type, stamped with `now`
    pub fn new(
        type_: ConditionType,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let ts = timestamp(now);
        Self {
            type_,
            status: ConditionStatus::True,
            last_update_time: ts.clone(),
            last_transition_time: ts,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Rollup order after the all-unknown check; the first type present wins
const ROLLUP_PRIORITY: [(ConditionType, &str, &str); 6] = [
    (ConditionType::Ready, "PodReady", "Some pods are ready"),
    (ConditionType::Started, "PodStarted", "Some pods are started"),
    (
        ConditionType::Initialized,
        "PodInitialized",
        "Some pods are initialized",
    ),
    (ConditionType::Deployed, "PodDeployed", "Some pods are deployed"),
    (ConditionType::Pending, "PodPending", "Some pods are pending"),
    (ConditionType::Failed, "PodFailed", "Some pods are failed"),
];

/// Fold per-pod classifications into one resource-level condition.
///
/// Optimistic: a single ready pod makes the whole compute node Ready. Returns
/// `None` when pods exist but none could be classified, in which case the
/// history should be left alone.
pub fn rollup(
    classes: &[Option<ConditionType>],
    now: DateTime<Utc>,
) -> Option<ComputeNodeCondition> {
    if classes.is_empty() {
        return Some(ComputeNodeCondition::new(
            ConditionType::Unknown,
            "PodNotFound",
            "No pod was found",
            now,
        ));
    }

    if classes
        .iter()
        .all(|c| *c == Some(ConditionType::Unknown))
    {
        return Some(ComputeNodeCondition::new(
            ConditionType::Unknown,
            "PodUnknown",
            "All pods are unknown",
            now,
        ));
    }

    ROLLUP_PRIORITY
        .iter()
        .find(|(t, _, _)| classes.contains(&Some(*t)))
        .map(|(t, reason, message)| ComputeNodeCondition::new(*t, *reason, *message, now))
}

/// Rollup over a pod list
pub fn rollup_pods(pods: &[Pod], now: DateTime<Utc>) -> Option<ComputeNodeCondition> {
    let classes: Vec<_> = pods.iter().map(classify_pod).collect();
    rollup(&classes, now)
}

/// Merge a rolled-up condition into the history.
///
/// The entry of the same type is replaced where it stands; a new type is
/// appended. Every other entry has its update time refreshed. Unknown is
/// exclusive: asserting it retires every other entry, and asserting anything
/// else retires the Unknown entry.
pub fn merge_condition(
    history: &[ComputeNodeCondition],
    cond: ComputeNodeCondition,
) -> Vec<ComputeNodeCondition> {
    let mut merged = Vec::with_capacity(history.len() + 1);
    let mut found = false;

    for existing in history {
        if existing.type_ == cond.type_ {
            // History is type-unique, a second match would be a corrupt input
            if !found {
                merged.push(cond.clone());
                found = true;
            }
            continue;
        }

        let mut other = existing.clone();
        if cond.type_ == ConditionType::Unknown || other.type_ == ConditionType::Unknown {
            other.status = ConditionStatus::False;
        }
        other.last_update_time = cond.last_update_time.clone();
        merged.push(other);
    }

    if !found {
        merged.push(cond);
    }

    merged
}
