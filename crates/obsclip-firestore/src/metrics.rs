//! Firestore call metrics.

use std::time::Duration;

use metrics::{counter, histogram};

pub mod names {
    /// Calls by operation and HTTP status.
    pub const CALLS_TOTAL: &str = "firestore_calls_total";
    /// Call latency by operation.
    pub const CALL_DURATION_SECONDS: &str = "firestore_call_duration_seconds";
    /// Retries by operation.
    pub const RETRIES_TOTAL: &str = "firestore_retries_total";
    /// Documents returned by runQuery, by collection.
    pub const QUERY_DOCUMENTS_TOTAL: &str = "firestore_query_documents_total";
    /// Conditional stage writes by stage and outcome.
    pub const STAGE_TRANSITIONS_TOTAL: &str = "firestore_stage_transitions_total";
}

pub fn record_call(operation: &'static str, status: u16, elapsed: Duration) {
    counter!(names::CALLS_TOTAL, "operation" => operation, "status" => status.to_string())
        .increment(1);
    histogram!(names::CALL_DURATION_SECONDS, "operation" => operation)
        .record(elapsed.as_secs_f64());
}

pub fn record_retry(operation: &str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

pub fn record_query_documents(collection: &str, count: usize) {
    counter!(names::QUERY_DOCUMENTS_TOTAL, "collection" => collection.to_string())
        .increment(count as u64);
}

pub fn record_transition(stage: &'static str, outcome: &'static str) {
    counter!(names::STAGE_TRANSITIONS_TOTAL, "stage" => stage, "outcome" => outcome)
        .increment(1);
}
