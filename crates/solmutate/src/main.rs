use cli::CliApp;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "solmutate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    CliApp::run().exit()
}
