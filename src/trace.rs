//! Queue events through `tracing`, compiled out entirely unless the `tracing` feature is on.

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, trace};

// Swallows the event so disabled logging adds nothing to `put`/`read`.
#[cfg(not(feature = "tracing"))]
macro_rules! disabled_event {
    ($($event:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use disabled_event as debug;
#[cfg(not(feature = "tracing"))]
pub(crate) use disabled_event as trace;

/// Print queue events to stderr, tagged with the emitting thread.
///
/// `RUST_LOG` picks the level, `fastchan=trace` when unset. Calling this again, or after some
/// other subscriber was installed, does nothing. Without the `tracing` feature it is a no-op.
pub fn init_tracing() {
    #[cfg(feature = "tracing")]
    {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("fastchan=trace"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
