use tracing::trace;

// Counters are trace events under `estate.metrics`; the log pipeline turns
// them into series.

pub fn inc_requests(route: &'static str) {
    trace!(target = "estate.metrics", route, "requests_total_inc");
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "estate.metrics",
        stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

/// `kind` is the failure kind, `None` for a generated draft.
pub fn generation_finished(kind: Option<&'static str>) {
    trace!(
        target = "estate.metrics",
        status = if kind.is_some() { "failed" } else { "success" },
        kind = kind.unwrap_or("none"),
        "generations_total_inc"
    );
}

/// One of `claimed`, `replayed`, `in_flight`, `mismatch`.
pub fn idempotency_outcome(outcome: &'static str) {
    trace!(target = "estate.metrics", outcome, "idempotency_total_inc");
}
