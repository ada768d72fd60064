use clap::Args;
use std::path::PathBuf;

/// Logging options from the command line and env vars; unset values fall
/// back to the `[logging]` config section
#[derive(Debug, Clone, Default, Args)]
pub struct LoggingConfig {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level", env = "XIAORUAN_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Log filter directives
    #[arg(long = "log-filter", env = "XIAORUAN_LOG_FILTER", global = true)]
    pub log_filter: Option<String>,

    /// Also write logs to this file
    #[arg(long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn get_effective_level(&self) -> &str {
        match (self.verbose, self.log_level.as_deref()) {
            (v, _) if v >= 2 => "trace", // -vv flag
            (1, _) => "debug",           // -v flag
            (0, Some(level)) => level,   // Configured level
            _ => "info",                 // Default
        }
    }

    /// Fill unset options from the `[logging]` config section
    pub fn with_fallback(mut self, level: Option<&str>, filter: Option<&str>) -> Self {
        if self.log_level.is_none() {
            self.log_level = level.map(str::to_string);
        }
        if self.log_filter.is_none() {
            self.log_filter = filter.map(str::to_string);
        }
        self
    }
}
