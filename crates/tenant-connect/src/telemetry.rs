use crate::config::TelemetryConfig;
use std::env;
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Where the active log directive came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveSource {
    Environment,
    Config,
}

impl DirectiveSource {
    fn label(self) -> &'static str {
        match self {
            DirectiveSource::Environment => "RUST_LOG",
            DirectiveSource::Config => "APP_LOG_LEVEL",
        }
    }
}

#[derive(Debug)]
pub enum TelemetryError {
    Directive {
        origin: DirectiveSource,
        directive: String,
        source: ParseError,
    },
    AlreadyInstalled(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::Directive {
                origin, directive, ..
            } => write!(
                f,
                "{} directive '{directive}' cannot drive connection logging",
                origin.label()
            ),
            TelemetryError::AlreadyInstalled(err) => {
                write!(f, "connection logging was already installed: {err}")
            }
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::Directive { source, .. } => Some(source),
            TelemetryError::AlreadyInstalled(err) => Some(&**err),
        }
    }
}

/// Build the log filter. A non-empty `override_directive` wins over the configured level.
pub fn connection_filter(
    override_directive: Option<&str>,
    config: &TelemetryConfig,
) -> Result<EnvFilter, TelemetryError> {
    let (origin, directive) = match override_directive.map(str::trim) {
        Some(directive) if !directive.is_empty() => (DirectiveSource::Environment, directive),
        _ => (DirectiveSource::Config, config.log_level.as_str()),
    };
    EnvFilter::try_new(directive).map_err(|source| TelemetryError::Directive {
        origin,
        directive: directive.to_string(),
        source,
    })
}

/// Install the global subscriber on stderr so command output stays clean on stdout.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let rust_log = env::var("RUST_LOG").ok();
    let filter = connection_filter(rust_log.as_deref(), config)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(TelemetryError::AlreadyInstalled)
}
