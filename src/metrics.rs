//! process wide prometheus meters

use once_cell::sync::Lazy;
use prometheus::{opts, register_int_counter_vec, IntCounterVec};

/// total number of failed or timed out command executions, keyed by
/// action path
static COMMAND_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    register_int_counter_vec!(
        opts!("errors_total", "total number of failed or timed out commands")
            .namespace("command_responder"),
        &["type"]
    )
    .expect("failed to register command error counter")
});

/// registers the meters with the default registry so they show up on
/// the telemetry endpoint before the first error occurs
pub fn setup_metrics() {
    Lazy::force(&COMMAND_ERRORS_TOTAL);
}

/// count one failed or timed out execution attempt of an action path,
/// called at most once per executor invocation
pub fn record_command_error(action_type: &str) {
    COMMAND_ERRORS_TOTAL.with_label_values(&[action_type]).inc();
}

#[cfg(test)]
pub(crate) fn command_errors(action_type: &str) -> u64 {
    COMMAND_ERRORS_TOTAL.with_label_values(&[action_type]).get()
}

/// serializes tests asserting exact counter deltas, the counters are
/// process globals and tests run in parallel
#[cfg(test)]
pub(crate) fn counter_test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    match LOCK.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
