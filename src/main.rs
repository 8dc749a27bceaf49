//! ProcessedOrNot lookup service: binary entrypoint
//! Boots the Axum HTTP server with the multi-source lookup and progress channels.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - LOOKUP_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("LOOKUP_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("lookup=debug,progress=info,search=debug,sources=info,warn")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    // Picks up LOOKUP_CONFIG_PATH, USDA_API_KEY, EAN_SEARCH_TOKEN.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let router = processed_or_not::app().await?;
    Ok(router.into())
}
