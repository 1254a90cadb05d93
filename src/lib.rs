pub mod commands;
pub mod config;
pub mod error;
pub mod generator;
pub mod imaging;
pub mod keys;
pub mod resolver;
pub mod state;
pub mod storage;

use lambda_runtime::{service_fn, LambdaEvent};
use serde_json::Value;
use state::AppState;
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` overrides the default `info` level.
/// Under Lambda the log service adds timestamps and cannot render colours.
pub fn init_tracing(lambda: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if lambda {
        builder.with_ansi(false).without_time().init();
    } else {
        builder.init();
    }
}

/// Serve invocations until the runtime shuts down.
pub async fn run_lambda(state: AppState) -> Result<(), lambda_runtime::Error> {
    tracing::info!(
        "lambda: starting (default bucket: {})",
        state.config.bucket.as_deref().unwrap_or("<none>")
    );
    let shared = &state;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        commands::invoke::handle_payload(shared, event.payload)
            .await
            .map_err(lambda_runtime::Error::from)
    }))
    .await
}
