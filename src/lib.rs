pub mod chat; // Send / apply / dismiss handlers
pub mod config;
pub mod llm; // Chat model collaborator + rotation
pub mod models;
pub mod notify;
pub mod pipeline; // Action extraction, validation, resolution, apply
pub mod store; // Record persistence collaborator

use tracing_subscriber::EnvFilter;

pub use chat::{ChatError, ChatReply, ChatSession};
pub use config::{AmbiguityPolicy, AssistantConfig};

/// Install the global fmt subscriber. `RUST_LOG` wins over the crate default.
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    tracing::info!("{} core v{}", config::APP_NAME, config::APP_VERSION);
}
