//! Coordination-store path layout for one pipeline:
//! `/railyard/pipeline/<T>/<P>/{lock,summary,events/...}`.

#[must_use]
pub fn pipeline_root(tenant: &str, pipeline: &str) -> String {
    format!("/railyard/pipeline/{tenant}/{pipeline}")
}

#[must_use]
pub fn lock_path(root: &str) -> String {
    format!("{root}/lock")
}

#[must_use]
pub fn summary_path(root: &str) -> String {
    format!("{root}/summary")
}

#[must_use]
pub fn trigger_queue_path(root: &str) -> String {
    format!("{root}/events/trigger")
}

#[must_use]
pub fn management_queue_path(root: &str) -> String {
    format!("{root}/events/management")
}

#[must_use]
pub fn result_queue_path(root: &str) -> String {
    format!("{root}/events/result")
}
