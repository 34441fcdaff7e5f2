pub mod bodies;
pub mod builders;
pub mod recording;
pub mod rejecting;

use std::sync::Once;
use std::time::Duration;

use kbflow::engine::Engine;
use kbflow::errors::Result;
use kbflow::processing::{Processing, ProcessingId};
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Poll until `check` holds, failing the test after 5 seconds.
pub async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    with_timeout(async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

/// The processing of `step` among `ids`.
pub fn processing_of(engine: &Engine, ids: &[ProcessingId], step: &str) -> Result<Processing> {
    for id in ids {
        let processing = engine.get_processing(*id)?;
        if processing.step == step {
            return Ok(processing);
        }
    }
    Err(kbflow::errors::KbflowError::StepNotFound(step.to_string()))
}
