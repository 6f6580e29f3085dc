//! Command-line interface for the demo server.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::net::IpAddr;
use std::path::PathBuf;

/// Command-line arguments.
///
/// Options left unset fall through to the environment, the config file,
/// and finally the built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Host address to bind to.
    pub host: Option<IpAddr>,
    /// Port to listen on.
    pub port: Option<u16>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Session (cookie) name.
    pub session_name: Option<String>,
    /// Cookie Max-Age in seconds.
    pub max_age: Option<i64>,
    /// Mark the session cookie Secure.
    pub secure: bool,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('H') | Long("host") => {
                let value: String = parser.value()?.parse()?;
                result.host = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("host", value))?,
                );
            }
            Short('p') | Long("port") => {
                let value: String = parser.value()?.parse()?;
                result.port = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("port", value))?,
                );
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('n') | Long("session-name") => {
                result.session_name = Some(parser.value()?.parse()?);
            }
            Long("max-age") => {
                let value: String = parser.value()?.parse()?;
                result.max_age = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("max-age", value))?,
                );
            }
            Long("secure") => {
                result.secure = true;
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"request-sessions {version}
Demo server for per-request session handling

USAGE:
    request-sessions [OPTIONS]

OPTIONS:
    -H, --host <ADDR>          Host address to bind [default: 127.0.0.1]
    -p, --port <PORT>          Port to listen on [default: 3000]
    -c, --config <FILE>        Path to configuration file (JSON)
    -n, --session-name <NAME>  Session cookie name [default: session]
        --max-age <SECS>       Cookie Max-Age; 0 = browser session [default: 3600]
        --secure               Only send the session cookie over HTTPS
    -l, --log-level <LVL>      Log level (error, warn, info, debug, trace)
    -h, --help                 Print help
    -V, --version              Print version

ENVIRONMENT VARIABLES:
    REQUEST_SESSIONS_HOST          Host address (overrides config)
    REQUEST_SESSIONS_PORT          Port number (overrides config)
    REQUEST_SESSIONS_SESSION_NAME  Session cookie name (overrides config)
    REQUEST_SESSIONS_LOG_LEVEL     Log level (overrides config)
    RUST_LOG                       Alternative log level setting

EXAMPLES:
    # Start with defaults (localhost:3000)
    request-sessions

    # Custom cookie name, one-day sessions
    request-sessions -n sid --max-age 86400

    # Start with config file
    request-sessions -c /etc/request-sessions/config.json
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("request-sessions {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
