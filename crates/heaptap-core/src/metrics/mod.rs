//! Metrics emission for heaptap.
//!
//! Events are recorded through the `metrics` facade. No exporter is installed
//! here; a host process that wants the numbers installs its own recorder
//! before running a sync.

pub mod events;

/// Emit an internal event.
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding metric.
///
/// # Example
///
/// ```ignore
/// use heaptap_core::emit;
/// use heaptap_core::metrics::events::RecordsEmitted;
///
/// emit!(RecordsEmitted { stream: "events".into(), count: 100 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
