//! Capture settings: defaults, environment overlay and the derived network stack.

use hd_archive::DEFAULT_LOG_MESSAGE;
use hd_core::HoardError;
use hd_core::HoardResult;
use hd_net::NetStack;
use hd_net::tls::TlsPolicy;
use std::time::Duration;

pub const ENV_BASE_URL: &str = "HOARD_BASE_URL";
pub const ENV_API_KEY: &str = "HOARD_API_KEY";
pub const ENV_HIDDEN_ELEMENTS: &str = "HOARD_HIDDEN_ELEMENTS";
pub const ENV_TIMEOUT_SECS: &str = "HOARD_TIMEOUT_SECS";

/// What happens to snapshot elements that the page does not display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HiddenElementPolicy {
    /// Remove them from the snapshot.
    Strip,
    /// Keep them, with an inline `display: none`.
    #[default]
    PreserveHidden,
}

impl HiddenElementPolicy {
    pub fn from_name(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strip" | "remove" => Some(Self::Strip),
            "preserve" | "preserve-hidden" | "keep" => Some(Self::PreserveHidden),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Archive service root, ending in `/`.
    pub base_url: String,
    pub api_key: String,
    pub hidden_elements: HiddenElementPolicy,
    pub request_timeout: Duration,
    pub max_redirects: usize,
    pub log_message: String,
    /// Try `/favicon.ico` when the page declares no icon.
    pub favicon_fallback: bool,
    pub https_only: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/".to_owned(),
            api_key: String::new(),
            hidden_elements: HiddenElementPolicy::default(),
            request_timeout: Duration::from_secs(30),
            max_redirects: 5,
            log_message: DEFAULT_LOG_MESSAGE.to_owned(),
            favicon_fallback: true,
            https_only: false,
        }
    }
}

impl CaptureConfig {
    pub fn from_env() -> HoardResult<Self> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Overlays variables read through `lookup` on the defaults.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> HoardResult<Self> {
        let mut config = Self::default();

        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|value| !value.trim().is_empty()) {
            config = config.with_base_url(&base_url);
        }
        if let Some(api_key) = lookup(ENV_API_KEY) {
            config.api_key = api_key.trim().to_owned();
        }
        if let Some(raw) = lookup(ENV_HIDDEN_ELEMENTS) {
            config.hidden_elements = HiddenElementPolicy::from_name(&raw).ok_or_else(|| {
                HoardError::new(
                    "capture.config.invalid",
                    format!("{ENV_HIDDEN_ELEMENTS} must be `strip` or `preserve`, got `{raw}`"),
                )
            })?;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let seconds = raw.trim().parse::<u64>().map_err(|error| {
                HoardError::new(
                    "capture.config.invalid",
                    format!("{ENV_TIMEOUT_SECS} `{raw}` is not a number of seconds: {error}"),
                )
            })?;
            config.request_timeout = Duration::from_secs(seconds.max(1));
        }

        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let trimmed = base_url.trim();
        self.base_url = if trimmed.ends_with('/') {
            trimmed.to_owned()
        } else {
            format!("{trimmed}/")
        };
        self
    }

    pub fn net_stack(&self) -> NetStack {
        NetStack::new(TlsPolicy::default().with_https_only(self.https_only))
            .with_timeout(self.request_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::CaptureConfig;
    use super::HiddenElementPolicy;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let table: BTreeMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |name| table.get(name).cloned()
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = CaptureConfig::default();
        assert_eq!(config.hidden_elements, HiddenElementPolicy::PreserveHidden);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.log_message, "Saved page from web extension");
        assert!(config.favicon_fallback);
    }

    #[test]
    fn environment_overlays_defaults() {
        let config = CaptureConfig::from_env_with(lookup(&[
            ("HOARD_BASE_URL", "https://hoard.example"),
            ("HOARD_API_KEY", " k3y "),
            ("HOARD_HIDDEN_ELEMENTS", "strip"),
            ("HOARD_TIMEOUT_SECS", "7"),
        ]));
        assert!(config.is_ok());
        let config = match config {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(config.base_url, "https://hoard.example/");
        assert_eq!(config.api_key, "k3y");
        assert_eq!(config.hidden_elements, HiddenElementPolicy::Strip);
        assert_eq!(config.net_stack().timeout, Duration::from_secs(7));
    }

    #[test]
    fn invalid_values_are_reported() {
        let config = CaptureConfig::from_env_with(lookup(&[("HOARD_HIDDEN_ELEMENTS", "sometimes")]));
        assert!(matches!(config, Err(ref error) if error.code == "capture.config.invalid"));

        let config = CaptureConfig::from_env_with(lookup(&[("HOARD_TIMEOUT_SECS", "soon")]));
        assert!(matches!(config, Err(ref error) if error.code == "capture.config.invalid"));
    }
}
