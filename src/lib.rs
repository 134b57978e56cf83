//! Multicam Sync - synchronized multi-camera capture and recording.
//!
//! Capture workers grab in lockstep through a two-phase rendezvous, a
//! dispatcher publishes one batch per cycle, and the recorder aligns frames
//! by timestamp before writing one video file per camera.

pub mod capture;
pub mod config;
pub mod recorder;
pub mod utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. Calling this more than once is
/// harmless.
pub fn init_tracing() {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "multicam_sync=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if result.is_ok() {
        tracing::info!("Starting Multicam Sync v{}", env!("CARGO_PKG_VERSION"));
    }
}
