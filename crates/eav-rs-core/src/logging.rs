//! Logging integration for eav-rs.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`EavSettings`] and for creating per-entity spans.

use crate::settings::EavSettings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The filter is read from `settings.log_level` (e.g. "debug",
/// "`eav_rs_db::sql=debug`"). In debug mode a pretty, human-readable format is
/// used; otherwise a structured JSON format. Installing twice is a no-op.
pub fn setup_logging(settings: &EavSettings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for work done on behalf of one entity.
///
/// # Examples
///
/// ```
/// use eav_rs_core::logging::entity_span;
///
/// let span = entity_span("test_project.patient", "42");
/// let _guard = span.enter();
/// tracing::debug!("saving attributes");
/// ```
pub fn entity_span(model: &str, pk: &str) -> tracing::Span {
    tracing::debug_span!("eav_entity", model = model, pk = pk)
}
