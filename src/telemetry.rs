//! Logging setup
//!
//! Structured logs go to stdout through `tracing-subscriber`, either as JSON
//! (for log collectors) or as plain text (for a terminal). `RUST_LOG`
//! overrides the default filter.

use std::str::FromStr;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::Error;

/// Filter applied when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,org_registry=debug,kube=info,tower=warn,hyper=warn";

/// Output format of log lines
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable text
    Plain,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "plain" | "text" => Ok(Self::Plain),
            _ => Err(Error::validation(
                "log-format",
                format!("unknown log format: {s}, expected one of: json, plain"),
            )),
        }
    }
}

/// Install the global subscriber; fails if one is already installed
pub fn init_logging(format: LogFormat) -> Result<(), Error> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed(),
        LogFormat::Plain => tracing_subscriber::fmt::layer().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::internal("telemetry", e.to_string()))
}
