//! `hoard-capture`: load a page and archive it as a self-contained document.

use clap::ArgAction;
use clap::Parser;
use hd_archive::HttpArchiveEndpoint;
use hd_archive::InMemoryArchive;
use hd_archive::TransactionClient;
use hd_archive::endpoint::ArchiveEndpoint;
use hd_capture::CaptureConfig;
use hd_capture::CaptureOutcome;
use hd_capture::HiddenElementPolicy;
use hd_capture::HttpResourceFetcher;
use hd_capture::PageLoader;
use hd_capture::SiteHookRegistry;
use hd_capture::capture;
use hd_core::HoardError;
use hd_core::HoardResult;
use hd_core::logging;
use hd_core::logging::Profile;
use serde_json::json;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "hoard-capture", version, about = "Archive a web page and its resources")]
struct Cli {
    /// Page to capture.
    #[arg(required_unless_present = "whoami")]
    url: Option<String>,

    /// Archive service root (overrides HOARD_BASE_URL).
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// API key (overrides HOARD_API_KEY).
    #[arg(long)]
    api_key: Option<String>,

    /// What to do with elements the page does not display.
    #[arg(long, value_name = "strip|preserve", value_parser = parse_hidden_policy)]
    hidden: Option<HiddenElementPolicy>,

    /// Per-request network timeout in seconds.
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Change-log message recorded with the document.
    #[arg(long)]
    log_message: Option<String>,

    /// Do not fall back to /favicon.ico when the page names no icon.
    #[arg(long, action = ArgAction::SetTrue)]
    no_favicon_fallback: bool,

    /// Refuse plain-HTTP page and resource fetches.
    #[arg(long, action = ArgAction::SetTrue)]
    https_only: bool,

    /// Check the API key against the archive and exit.
    #[arg(long, action = ArgAction::SetTrue)]
    whoami: bool,

    /// Capture into an in-memory archive instead of the configured service.
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,

    /// Print the result as JSON.
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    #[arg(long, value_name = "human|json", default_value = "human", value_parser = parse_log_format)]
    log_format: Profile,
}

fn parse_hidden_policy(value: &str) -> Result<HiddenElementPolicy, String> {
    HiddenElementPolicy::from_name(value).ok_or_else(|| format!("expected `strip` or `preserve`, got `{value}`"))
}

fn parse_log_format(value: &str) -> Result<Profile, String> {
    Profile::from_name(value).ok_or_else(|| format!("expected `human` or `json`, got `{value}`"))
}

impl Cli {
    /// Environment first, then flags.
    fn config(&self) -> HoardResult<CaptureConfig> {
        let mut config = CaptureConfig::from_env()?;
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url);
        }
        if let Some(api_key) = &self.api_key {
            config.api_key = api_key.clone();
        }
        if let Some(policy) = self.hidden {
            config.hidden_elements = policy;
        }
        if let Some(seconds) = self.timeout_secs {
            config.request_timeout = Duration::from_secs(seconds.max(1));
        }
        if let Some(message) = &self.log_message {
            config.log_message = message.clone();
        }
        if self.no_favicon_fallback {
            config.favicon_fallback = false;
        }
        if self.https_only {
            config.https_only = true;
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(code = error.code, %error, "hoard-capture failed");
            eprintln!("error: {error}");
            exit_code(&error)
        }
    }
}

/// 2 for bad configuration, 3 when the network failed, 1 otherwise.
fn exit_code(error: &HoardError) -> ExitCode {
    if error.is_in("capture.config") {
        ExitCode::from(2)
    } else if error.is_in("net") {
        ExitCode::from(3)
    } else {
        ExitCode::FAILURE
    }
}

fn run(cli: &Cli) -> HoardResult<()> {
    let config = cli.config()?;
    if config.api_key.is_empty() && !cli.dry_run {
        return Err(HoardError::new(
            "capture.config.invalid",
            "no API key: pass --api-key or set HOARD_API_KEY",
        ));
    }

    if cli.dry_run {
        let archive = InMemoryArchive::new(&config.base_url);
        return dispatch(cli, &config, TransactionClient::new(archive, &config.api_key));
    }

    let endpoint = HttpArchiveEndpoint::new(&config.base_url, config.net_stack())?;
    dispatch(cli, &config, TransactionClient::new(endpoint, &config.api_key))
}

fn dispatch<E: ArchiveEndpoint>(cli: &Cli, config: &CaptureConfig, mut client: TransactionClient<E>) -> HoardResult<()> {
    if cli.whoami {
        let identity = client.whoami()?;
        if cli.json {
            println!("{}", json!({ "ok": identity.ok, "hello": identity.hello }));
        } else if identity.ok {
            println!("key accepted: {}", identity.hello.unwrap_or_default());
        } else {
            println!("key rejected");
        }
        return Ok(());
    }

    let Some(url) = cli.url.as_deref() else {
        return Err(HoardError::new("capture.config.invalid", "no page URL given"));
    };
    let outcome = capture_page(&mut client, url, config)?;

    if cli.json {
        println!(
            "{}",
            json!({
                "success": outcome.success,
                "document_id": outcome.document_id,
                "full_url": outcome.full_url,
                "finalized": outcome.finalized,
            })
        );
    } else {
        println!("{}", outcome.full_url);
        if !outcome.finalized {
            eprintln!("warning: the archive did not confirm finalization of document {}", outcome.document_id);
        }
    }
    Ok(())
}

fn capture_page<E: ArchiveEndpoint>(
    client: &mut TransactionClient<E>,
    url: &str,
    config: &CaptureConfig,
) -> HoardResult<CaptureOutcome> {
    let mut fetcher = HttpResourceFetcher::new(config.net_stack(), config.max_redirects)?;
    let mut page = PageLoader::new(&mut fetcher).load(url)?;
    let hooks = SiteHookRegistry::builtin()?;

    client.open(page.url.as_str())?;
    capture(&mut page, client, &mut fetcher, config, &hooks)
}
