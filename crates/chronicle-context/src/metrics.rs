//! Prometheus metrics for context assembly
//!
//! Compiled only with the `metrics` feature; without it every recorder is a no-op.

#[cfg(feature = "metrics")]
mod registry {
    use lazy_static::lazy_static;
    use prometheus::{
        register_counter_vec, register_histogram, register_int_counter, CounterVec, Histogram,
        IntCounter,
    };

    lazy_static! {
        /// Summarization attempts by outcome
        pub static ref SUMMARY_ATTEMPTS: CounterVec = register_counter_vec!(
            "chronicle_context_summary_attempts_total",
            "Summarization attempts by outcome",
            &["outcome"]
        )
        .unwrap();

        /// Assembled context size
        pub static ref CONTEXT_TOKENS: Histogram = register_histogram!(
            "chronicle_context_tokens",
            "Estimated tokens in assembled contexts",
            vec![64.0, 256.0, 512.0, 1024.0, 2048.0, 4096.0, 8192.0, 16384.0]
        )
        .unwrap();

        /// Recent-window messages dropped to fit the budget
        pub static ref TRIMMED_MESSAGES: IntCounter = register_int_counter!(
            "chronicle_context_trimmed_messages_total",
            "Verbatim messages dropped to fit the token budget"
        )
        .unwrap();
    }
}

#[cfg(feature = "metrics")]
pub use registry::{CONTEXT_TOKENS, SUMMARY_ATTEMPTS, TRIMMED_MESSAGES};

pub(crate) fn record_summary(outcome: &str) {
    #[cfg(feature = "metrics")]
    SUMMARY_ATTEMPTS.with_label_values(&[outcome]).inc();
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}

pub(crate) fn record_context(tokens: usize, trimmed: usize) {
    #[cfg(feature = "metrics")]
    {
        CONTEXT_TOKENS.observe(tokens as f64);
        TRIMMED_MESSAGES.inc_by(trimmed as u64);
    }
    #[cfg(not(feature = "metrics"))]
    let _ = (tokens, trimmed);
}
