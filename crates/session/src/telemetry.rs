//! Tracing bootstrap for hosts and tests.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global tracing subscriber.
///
/// Reads `.env`, then filters by `CYTOLAB_LOG` (falling back to `info` for
/// both workspace crates). Safe to call more than once; later calls keep the
/// first subscriber, which lets every test invoke it freely.
pub fn init_tracing() {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("CYTOLAB_LOG")
                .unwrap_or_else(|_| "cytolab_core=info,cytolab_session=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();
}
