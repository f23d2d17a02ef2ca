use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use realtime::{DispatcherSettings, HeartbeatSettings};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full CORS origin URLs that allowed to receive server responses.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "http://localhost:3000,https://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,

    /// Seconds between heartbeat sweeps over all live connections
    #[arg(long, env, default_value_t = 10)]
    pub heartbeat_interval_secs: u64,

    /// Seconds without client activity after which a connection is evicted.
    /// Keep this at two to three times the client heartbeat interval.
    #[arg(long, env, default_value_t = 30)]
    pub stale_threshold_secs: u64,

    /// Seconds without client activity after which a transport ping is sent.
    /// Set to 0 to disable probing.
    #[arg(long, env, default_value_t = 20)]
    pub probe_threshold_secs: u64,

    /// Milliseconds a single recipient may hold up a broadcast before it is retired
    #[arg(long, env, default_value_t = 2000)]
    pub send_timeout_ms: u64,

    /// Capacity of each connection's outbound frame queue
    #[arg(long, env, default_value_t = 64)]
    pub outbound_buffer: usize,

    /// HMAC secret used to verify dashboard bearer tokens.
    #[arg(long, env)]
    jwt_secret: Option<String>,

    /// Expected `iss` claim of dashboard bearer tokens, if any.
    #[arg(long, env)]
    jwt_issuer: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    /// Parses an explicit argument list instead of the process arguments.
    /// Environment variables still apply.
    pub fn from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Config::parse_from(args)
    }

    pub fn set_jwt_secret(mut self, jwt_secret: String) -> Self {
        self.jwt_secret = Some(jwt_secret);
        self
    }

    pub fn jwt_secret(&self) -> Option<&str> {
        self.jwt_secret.as_deref()
    }

    pub fn jwt_issuer(&self) -> Option<&str> {
        self.jwt_issuer.as_deref()
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }

    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            send_timeout: Duration::from_millis(self.send_timeout_ms),
        }
    }

    pub fn heartbeat_settings(&self) -> HeartbeatSettings {
        let probe_after = (self.probe_threshold_secs > 0
            && self.probe_threshold_secs < self.stale_threshold_secs)
            .then(|| Duration::from_secs(self.probe_threshold_secs));

        HeartbeatSettings {
            interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            stale_after: Duration::from_secs(self.stale_threshold_secs),
            probe_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::from_args(std::iter::once("dashboard_realtime").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_match_a_ten_second_client_heartbeat() {
        let config = parse(&[]);
        let heartbeat = config.heartbeat_settings();

        assert_eq!(heartbeat.interval, Duration::from_secs(10));
        assert_eq!(heartbeat.stale_after, Duration::from_secs(30));
        assert_eq!(heartbeat.probe_after, Some(Duration::from_secs(20)));
        assert_eq!(
            config.dispatcher_settings().send_timeout,
            Duration::from_secs(2)
        );
        assert_eq!(config.outbound_buffer, 64);
    }

    #[test]
    fn probing_is_disabled_by_zero_or_out_of_range_threshold() {
        let config = parse(&["--probe-threshold-secs", "0"]);
        assert_eq!(config.heartbeat_settings().probe_after, None);

        let config = parse(&["--probe-threshold-secs", "40", "--stale-threshold-secs", "30"]);
        assert_eq!(config.heartbeat_settings().probe_after, None);
    }

    #[test]
    fn runtime_env_parses_case_insensitively() {
        assert_eq!("PRODUCTION".parse::<RustEnv>(), Ok(RustEnv::Production));
        assert_eq!("staging".parse::<RustEnv>(), Ok(RustEnv::Staging));
        assert_eq!("qa".parse::<RustEnv>(), Err(RustEnvParseError));
    }

    #[test]
    fn jwt_secret_can_be_set_programmatically() {
        let config = parse(&[]).set_jwt_secret("s3cret".into());
        assert_eq!(config.jwt_secret(), Some("s3cret"));
    }
}
