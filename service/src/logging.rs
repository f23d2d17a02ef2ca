use crate::config::{Config, RustEnv};
use log::{LevelFilter, SetLoggerError};
use simplelog::{self, ColorChoice, ConfigBuilder, TerminalMode};

/// Modules to filter out from logging when not in Trace mode.
/// HTTP and WebSocket stacks log every frame at debug level.
const FILTERED_MODULES: &[&str] = &[
    "tower",
    "tower_http",
    "tracing",
    "hyper",
    "axum",
    "tungstenite",
    "tokio_tungstenite",
];

pub struct Logger {}

impl Logger {
    /// Installs the global terminal logger.
    ///
    /// Trace level shows everything, including dependency logs. Deployed
    /// environments log without colors so aggregated output stays readable.
    pub fn init_logger(config: &Config) -> Result<(), SetLoggerError> {
        let apply_filters = Self::should_filter_dependencies(config.log_level_filter);
        let log_config = Self::build_log_config(apply_filters);

        simplelog::TermLogger::init(
            Self::convert_level_filter(config.log_level_filter),
            log_config,
            TerminalMode::Mixed,
            Self::color_choice(&config.runtime_env),
        )
    }

    fn convert_level_filter(level: LevelFilter) -> simplelog::LevelFilter {
        match level {
            LevelFilter::Off => simplelog::LevelFilter::Off,
            LevelFilter::Error => simplelog::LevelFilter::Error,
            LevelFilter::Warn => simplelog::LevelFilter::Warn,
            LevelFilter::Info => simplelog::LevelFilter::Info,
            LevelFilter::Debug => simplelog::LevelFilter::Debug,
            LevelFilter::Trace => simplelog::LevelFilter::Trace,
        }
    }

    fn should_filter_dependencies(level: LevelFilter) -> bool {
        level != LevelFilter::Trace
    }

    fn color_choice(env: &RustEnv) -> ColorChoice {
        match env {
            RustEnv::Development => ColorChoice::Auto,
            RustEnv::Staging | RustEnv::Production => ColorChoice::Never,
        }
    }

    fn build_log_config(apply_filters: bool) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();

        if apply_filters {
            for module in FILTERED_MODULES {
                builder.add_filter_ignore_str(*module);
            }
        }

        builder.build()
    }
}
