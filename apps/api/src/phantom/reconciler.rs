//! Result Reconciler: turns raw job records into `CandidateProfile`s.
//!
//! Search mode converts every record independently and applies freshness and
//! open-to-work filtering. Single-target mode keeps only records whose URL
//! corresponds to the requested profile; anything else is stale output from
//! an earlier run sharing the same artifact path.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::models::candidate::CandidateProfile;
use crate::phantom::error::OrchestrationError;
use crate::phantom::probes::{
    block_text, experience_of, first_text, name_of, timestamp_of, urls_correspond,
    OpenToWorkClassifier, Record, ABOUT_KEYS, EDUCATION_KEYS, HEADLINE_KEYS, LOCATION_KEYS,
    URL_KEYS,
};
use crate::phantom::retriever::RawResultPayload;

#[derive(Debug, Clone)]
pub enum ReconcileMode {
    Search {
        /// Records must carry a timestamp at or after this instant.
        min_freshness: Option<DateTime<Utc>>,
        /// Drop records not classified as open to work.
        require_open_to_work: bool,
        max_results: Option<usize>,
    },
    SingleTarget {
        target_url: String,
    },
}

/// Per-reason drop counters, complete once the iterator is drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub accepted: usize,
    pub malformed: usize,
    pub stale: usize,
    pub identity_mismatch: usize,
    pub not_open_to_work: usize,
}

impl ReconcileStats {
    pub fn dropped(&self) -> usize {
        self.malformed + self.stale + self.identity_mismatch + self.not_open_to_work
    }
}

enum Rejection {
    Malformed(OrchestrationError),
    Stale,
    IdentityMismatch,
    NotOpenToWork,
}

/// Single-pass, order-preserving iterator over accepted profiles.
pub struct Reconciliation<'a> {
    records: std::vec::IntoIter<Value>,
    mode: ReconcileMode,
    classifier: &'a OpenToWorkClassifier,
    stats: ReconcileStats,
}

pub fn reconcile(
    payload: RawResultPayload,
    mode: ReconcileMode,
    classifier: &OpenToWorkClassifier,
) -> Reconciliation<'_> {
    Reconciliation {
        records: payload.into_iter(),
        mode,
        classifier,
        stats: ReconcileStats::default(),
    }
}

impl Reconciliation<'_> {
    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    fn is_full(&self) -> bool {
        match self.mode {
            ReconcileMode::Search {
                max_results: Some(max),
                ..
            } => self.stats.accepted >= max,
            _ => false,
        }
    }

    fn accept(&self, record: Value) -> Result<CandidateProfile, Rejection> {
        let Value::Object(record) = record else {
            return Err(Rejection::Malformed(OrchestrationError::MalformedRecord(
                "record is not an object".to_string(),
            )));
        };

        match &self.mode {
            ReconcileMode::SingleTarget { target_url } => {
                let corresponds = URL_KEYS
                    .iter()
                    .filter_map(|key| record.get(*key).and_then(Value::as_str))
                    .any(|url| urls_correspond(url, target_url));
                if !corresponds {
                    return Err(Rejection::IdentityMismatch);
                }
                candidate_from_record(&record, self.classifier).map_err(Rejection::Malformed)
            }
            ReconcileMode::Search {
                min_freshness,
                require_open_to_work,
                ..
            } => {
                let candidate =
                    candidate_from_record(&record, self.classifier).map_err(Rejection::Malformed)?;
                if let Some(cutoff) = min_freshness {
                    // Without a timestamp freshness cannot be proven.
                    match timestamp_of(&record) {
                        Some(produced_at) if produced_at >= *cutoff => {}
                        _ => return Err(Rejection::Stale),
                    }
                }
                if *require_open_to_work && !candidate.is_open_to_work {
                    return Err(Rejection::NotOpenToWork);
                }
                Ok(candidate)
            }
        }
    }

    fn tally(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::Malformed(e) => {
                debug!("Dropping record: {e}");
                self.stats.malformed += 1;
            }
            Rejection::Stale => self.stats.stale += 1,
            Rejection::IdentityMismatch => self.stats.identity_mismatch += 1,
            Rejection::NotOpenToWork => self.stats.not_open_to_work += 1,
        }
    }
}

impl Iterator for Reconciliation<'_> {
    type Item = CandidateProfile;

    fn next(&mut self) -> Option<CandidateProfile> {
        while !self.is_full() {
            let record = self.records.next()?;
            match self.accept(record) {
                Ok(candidate) => {
                    self.stats.accepted += 1;
                    return Some(candidate);
                }
                Err(rejection) => self.tally(rejection),
            }
        }
        None
    }
}

/// Builds a complete profile from one record, or reports it malformed.
pub fn candidate_from_record(
    record: &Record,
    classifier: &OpenToWorkClassifier,
) -> Result<CandidateProfile, OrchestrationError> {
    let name = name_of(record).ok_or_else(|| {
        let keys: Vec<&str> = record.keys().map(String::as_str).collect();
        OrchestrationError::MalformedRecord(format!(
            "no name under any known key (record keys: {})",
            keys.join(", ")
        ))
    })?;

    Ok(CandidateProfile {
        headline: first_text(record, HEADLINE_KEYS),
        location: first_text(record, LOCATION_KEYS),
        about: first_text(record, ABOUT_KEYS),
        experience_text: experience_of(record),
        education_text: block_text(record, EDUCATION_KEYS),
        is_open_to_work: classifier.classify(record),
        ..CandidateProfile::new(name, first_text(record, URL_KEYS))
    })
}
