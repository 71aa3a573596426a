//! Process-wide `tracing` subscriber bootstrap.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "hoard_capture=info,hd_capture=info,hd_archive=info,hd_net=warn";

/// Output profile for the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable, single-line events.
    Human,
    /// Newline-delimited JSON events.
    Json,
}

impl Profile {
    pub fn from_name(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "human" | "text" | "pretty" => Some(Self::Human),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

static INIT_ONCE: Once = Once::new();

/// Installs the global subscriber once; later calls are no-ops.
///
/// The filter comes from `RUST_LOG` when set and falls back to a quiet
/// default that keeps capture milestones visible.
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let installed = match profile {
            Profile::Human => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init(),
            Profile::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init(),
        };

        // Another subscriber (a test harness, an embedding host) may already own the slot.
        if installed.is_ok() {
            tracing::debug!(?profile, "log subscriber installed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::Profile;
    use super::init;

    #[test]
    fn init_is_idempotent() {
        init(Profile::Human);
        init(Profile::Json);
        init(Profile::Human);
    }

    #[test]
    fn parses_profile_names() {
        assert_eq!(Profile::from_name("JSON"), Some(Profile::Json));
        assert_eq!(Profile::from_name(" human "), Some(Profile::Human));
        assert_eq!(Profile::from_name("xml"), None);
    }
}
