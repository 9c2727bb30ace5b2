//! Scheduler configuration.
//!
//! Every option can be given as a flag or an environment variable. The parsed
//! [`Args`] are validated once into a [`Config`] that is shared with every
//! component; nothing reads the environment after startup.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::{bail, Result};
use clap::builder::{BoolishValueParser, FalseyValueParser};
use clap::{ArgAction, Parser, ValueEnum};
use runner_events::{Repository, DEFAULT_LABEL_PREFIX};
use runner_fleet::DEFAULT_API_URL;

/// Image run by every provisioned runner.
pub const DEFAULT_RUNNER_IMAGE: &str = "koyeb/github-runner";

const MIN_REAPER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Which GitHub scope a provisioned runner registers against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Mode {
    /// Register against the repository that triggered the job.
    #[default]
    Repository,
    /// Register against the organization owning that repository.
    Organization,
}

impl Mode {
    /// URL the runner registers against for a job from `repository`.
    pub fn registration_url(&self, repository: &Repository) -> String {
        match self {
            Mode::Repository => format!("https://github.com/{}", repository.full_name),
            Mode::Organization => format!("https://github.com/{}", repository.owner()),
        }
    }
}

/// Provision ephemeral GitHub Actions runners on Koyeb.
#[derive(Debug, Parser)]
#[command(name = "runner-scheduler")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Koyeb API token used to create runners.
    #[arg(long, env = "KOYEB_TOKEN", hide_env_values = true)]
    pub koyeb_token: Option<String>,

    /// Koyeb API base URL.
    #[arg(long, env = "KOYEB_API_URL", default_value = DEFAULT_API_URL)]
    pub koyeb_api_url: String,

    /// GitHub token handed to runners so they can register.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, default_value = "")]
    pub github_token: String,

    /// Secret shared with the GitHub webhook.
    #[arg(long, env = "API_SECRET", hide_env_values = true)]
    pub api_secret: Option<String>,

    /// Runners TTL in minutes.
    #[arg(long, env = "RUNNERS_TTL", default_value_t = 120)]
    pub runners_ttl: u64,

    /// Run runners unprivileged, without a Docker daemon.
    #[arg(long, env = "DISABLE_DOCKER_DAEMON", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub disable_docker_daemon: bool,

    /// Scheduler mode.
    #[arg(short, long, env = "MODE", value_enum, default_value_t = Mode::Repository)]
    pub mode: Mode,

    /// Job labels must look like `<prefix>-<region>-<instance type>`.
    #[arg(long, env = "LABEL_PREFIX", default_value = DEFAULT_LABEL_PREFIX)]
    pub label_prefix: String,

    /// Container image for runners.
    #[arg(long, env = "RUNNER_IMAGE", default_value = DEFAULT_RUNNER_IMAGE)]
    pub runner_image: String,

    /// Delete a runner as soon as a `completed` event reaches it.
    #[arg(long, env = "TEARDOWN_ON_COMPLETED", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub teardown_on_completed: bool,

    /// INSECURE: accept webhooks without checking their signature.
    ///
    /// Only meant for local testing.
    #[arg(long, env = "DISABLE_AUTH", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    pub disable_auth: bool,

    /// How often each runner's TTL is checked, in milliseconds.
    #[arg(long, env = "REAPER_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub reaper_poll_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Validated scheduler configuration.
#[derive(Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub koyeb_token: String,
    pub koyeb_api_url: String,
    pub github_token: String,
    pub api_secret: String,
    pub runners_ttl: Duration,
    pub disable_docker_daemon: bool,
    pub mode: Mode,
    pub label_prefix: String,
    pub runner_image: String,
    pub teardown_on_completed: bool,
    /// Skip webhook signature verification.
    pub disable_auth: bool,
    pub reaper_poll_interval: Duration,
    pub log_level: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("listen_addr", &self.listen_addr)
            .field("koyeb_token", &"<redacted>")
            .field("koyeb_api_url", &self.koyeb_api_url)
            .field("github_token", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("runners_ttl", &self.runners_ttl)
            .field("disable_docker_daemon", &self.disable_docker_daemon)
            .field("mode", &self.mode)
            .field("label_prefix", &self.label_prefix)
            .field("runner_image", &self.runner_image)
            .field("teardown_on_completed", &self.teardown_on_completed)
            .field("disable_auth", &self.disable_auth)
            .field("reaper_poll_interval", &self.reaper_poll_interval)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Validate parsed arguments.
    pub fn from_args(args: Args) -> Result<Self> {
        if args.port == 0 {
            bail!("PORT or --port must be omitted or valid");
        }

        let koyeb_token = args.koyeb_token.unwrap_or_default();
        if koyeb_token.is_empty() {
            bail!("KOYEB_TOKEN or --koyeb-token must be set to a valid Koyeb API token used to create runners");
        }

        let api_secret = args.api_secret.unwrap_or_default();
        if api_secret.is_empty() && !args.disable_auth {
            bail!("API_SECRET or --api-secret must be set to a valid secret used to authenticate webhook requests");
        }

        if args.runners_ttl == 0 {
            bail!("RUNNERS_TTL or --runners-ttl must be a positive number of minutes");
        }

        if args.label_prefix.is_empty() || args.label_prefix.contains('-') {
            bail!("LABEL_PREFIX or --label-prefix must be a non-empty string without '-'");
        }

        Ok(Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port)),
            koyeb_token,
            koyeb_api_url: args.koyeb_api_url,
            github_token: args.github_token,
            api_secret,
            runners_ttl: Duration::from_secs(args.runners_ttl * 60),
            disable_docker_daemon: args.disable_docker_daemon,
            mode: args.mode,
            label_prefix: args.label_prefix,
            runner_image: args.runner_image,
            teardown_on_completed: args.teardown_on_completed,
            disable_auth: args.disable_auth,
            reaper_poll_interval: Duration::from_millis(args.reaper_poll_interval_ms)
                .max(MIN_REAPER_POLL_INTERVAL),
            log_level: args.log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec![
            "runner-scheduler",
            "--koyeb-token",
            "koyeb-tok",
            "--api-secret",
            "s3cr3t",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_flags_are_applied() {
        let config = Config::from_args(args(&[
            "--port",
            "9000",
            "--runners-ttl",
            "5",
            "--mode",
            "organization",
            "--label-prefix",
            "gpu",
            "--reaper-poll-interval-ms",
            "10",
            "--disable-docker-daemon",
            "--teardown-on-completed",
        ]))
        .unwrap();

        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.koyeb_token, "koyeb-tok");
        assert_eq!(config.api_secret, "s3cr3t");
        assert_eq!(config.runners_ttl, Duration::from_secs(300));
        assert_eq!(config.mode, Mode::Organization);
        assert_eq!(config.label_prefix, "gpu");
        assert_eq!(config.reaper_poll_interval, MIN_REAPER_POLL_INTERVAL);
        assert!(config.disable_docker_daemon);
        assert!(config.teardown_on_completed);
    }

    #[test]
    fn test_missing_koyeb_token_is_rejected() {
        let mut args = args(&[]);
        args.koyeb_token = None;
        assert!(Config::from_args(args).is_err());
    }

    #[test]
    fn test_api_secret_required_unless_auth_disabled() {
        let mut without_secret = args(&[]);
        without_secret.api_secret = Some(String::new());
        without_secret.disable_auth = false;
        assert!(Config::from_args(without_secret).is_err());

        let mut auth_disabled = args(&[]);
        auth_disabled.api_secret = None;
        auth_disabled.disable_auth = true;
        let config = Config::from_args(auth_disabled).unwrap();
        assert!(config.disable_auth);
    }

    #[rstest]
    #[case(&["--runners-ttl", "0"])]
    #[case(&["--port", "0"])]
    #[case(&["--label-prefix", "my-prefix"])]
    #[case(&["--mode", "enterprise"])]
    fn test_invalid_values_are_rejected(#[case] extra: &[&str]) {
        let mut argv = vec!["runner-scheduler", "--koyeb-token", "t", "--api-secret", "s"];
        argv.extend_from_slice(extra);
        let result = Args::try_parse_from(argv)
            .map_err(anyhow::Error::from)
            .and_then(Config::from_args);
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", Config::from_args(args(&[])).unwrap());
        assert!(!rendered.contains("s3cr3t"));
        assert!(!rendered.contains("koyeb-tok"));
    }

    #[test]
    fn test_registration_url() {
        let repo = Repository {
            full_name: "acme/app".to_string(),
        };
        assert_eq!(
            Mode::Repository.registration_url(&repo),
            "https://github.com/acme/app"
        );
        assert_eq!(
            Mode::Organization.registration_url(&repo),
            "https://github.com/acme"
        );
    }
}
