//! Capture metrics.
//!
//! # Metrics
//! - `devconsole_records_appended_total` (counter): appends by store
//! - `devconsole_records_evicted_total` (counter): FIFO evictions by store
//! - `devconsole_store_size` (gauge): current record count by store
//! - `devconsole_log_repeats_total` (counter): log calls folded into a repeat
//! - `devconsole_stale_completions_total` (counter): completions for evicted records
//! - `devconsole_network_completed_total` (counter): completions by terminal state
//!
//! # Design Decisions
//! - Only the `metrics` facade is used; no exporter is started, so nothing
//!   leaves the process unless the embedder installs a recorder

pub fn record_append(store: &'static str) {
    metrics::counter!("devconsole_records_appended_total", "store" => store).increment(1);
}

pub fn record_eviction(store: &'static str) {
    metrics::counter!("devconsole_records_evicted_total", "store" => store).increment(1);
}

pub fn record_store_size(store: &'static str, len: usize) {
    metrics::gauge!("devconsole_store_size", "store" => store).set(len as f64);
}

pub fn record_log_repeat() {
    metrics::counter!("devconsole_log_repeats_total").increment(1);
}

pub fn record_stale_completion() {
    metrics::counter!("devconsole_stale_completions_total").increment(1);
}

pub fn record_network_completion(state: &'static str) {
    metrics::counter!("devconsole_network_completed_total", "state" => state).increment(1);
}
