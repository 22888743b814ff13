//! Command-line parsing
//!
//! ```text
//! gapi-cmdline sub <broker> <topic>
//! gapi-cmdline pub <broker> <topic> <message>
//! ```
//!
//! Missing positional arguments are reported with the short usage text and
//! exit status 1, not clap's default status 2.

use crate::config::Overrides;
use clap::error::ErrorKind;
use clap::{Args, Parser};
use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;

/// Operation selected by the first argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Subscribe,
    Publish,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sub" => Ok(Mode::Subscribe),
            "pub" => Ok(Mode::Publish),
            other => Err(other.to_string()),
        }
    }
}

/// Connection flags shared by both binaries
#[derive(Debug, Clone, Default, Args)]
pub struct ConnectionArgs {
    /// Broker port when the broker is given as a bare host
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Keep-alive interval in seconds
    #[arg(short = 'k', long = "keep-alive", value_name = "SECS")]
    pub keep_alive: Option<u64>,

    /// Client identifier (generated when omitted)
    #[arg(short = 'i', long = "id")]
    pub client_id: Option<String>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "GAPI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose logging (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl ConnectionArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            port: self.port,
            keep_alive_secs: self.keep_alive,
            client_id: self.client_id.clone(),
        }
    }
}

/// MQTT publish/subscribe test harness
#[derive(Debug, Parser)]
#[command(name = "gapi-cmdline")]
#[command(about = "Publish to or subscribe on an MQTT broker")]
#[command(version)]
struct PubSubCli {
    /// Operation: `sub` or `pub`
    mode: String,

    /// Broker host, or mqtt:// / mqtts:// URL
    broker: String,

    /// Topic to publish to or subscribe on
    topic: String,

    /// Message to publish (pub mode only)
    #[arg(allow_negative_numbers = true)]
    message: Option<String>,

    #[command(flatten)]
    connection: ConnectionArgs,
}

/// Broker connectivity check
#[derive(Debug, Parser)]
#[command(name = "gapi-connection")]
#[command(about = "Connect to an MQTT broker and disconnect again")]
#[command(version)]
struct ConnectionCli {
    /// Broker host, or mqtt:// / mqtts:// URL
    broker: String,

    #[command(flatten)]
    connection: ConnectionArgs,
}

/// Parsed pub/sub invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub mode: Mode,
    pub broker: String,
    pub topic: String,
    pub message: String,
    pub connection: ConnectionArgs,
}

/// Parsed connection-check invocation
#[derive(Debug, Clone)]
pub struct ConnectionInvocation {
    pub broker: String,
    pub connection: ConnectionArgs,
}

/// Why arguments could not be turned into an invocation
#[derive(Debug)]
pub enum CliError {
    /// `--help` or `--version`; clap prints it and exits 0
    Display(clap::Error),
    /// Missing or malformed arguments
    Usage {
        usage: String,
        detail: Option<String>,
    },
    UnknownMode(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Display(_) => 0,
            _ => 1,
        }
    }
}

pub fn pubsub_usage(program: &str) -> String {
    format!("Usage:\n  {program} sub <broker> <topic>\n  {program} pub <broker> <topic> <message>\n")
}

pub fn connection_usage(program: &str) -> String {
    format!("Usage:\n  {program} <broker>\n")
}

fn program_name(args: &[OsString], fallback: &str) -> String {
    args.first()
        .map(|arg| arg.to_string_lossy().into_owned())
        .unwrap_or_else(|| fallback.to_string())
}

fn classify(error: clap::Error, usage: String) -> CliError {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => CliError::Display(error),
        ErrorKind::MissingRequiredArgument
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
            CliError::Usage { usage, detail: None }
        }
        _ => CliError::Usage {
            usage,
            detail: Some(error.render().to_string()),
        },
    }
}

impl Invocation {
    pub fn try_from_args<I, T>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let program = program_name(&args, "gapi-cmdline");
        let cli = PubSubCli::try_parse_from(&args)
            .map_err(|e| classify(e, pubsub_usage(&program)))?;

        let mode = cli.mode.parse::<Mode>().map_err(CliError::UnknownMode)?;

        Ok(Self {
            mode,
            broker: cli.broker,
            topic: cli.topic,
            message: cli.message.unwrap_or_default(),
            connection: cli.connection,
        })
    }
}

impl ConnectionInvocation {
    pub fn try_from_args<I, T>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let program = program_name(&args, "gapi-connection");
        let cli = ConnectionCli::try_parse_from(&args)
            .map_err(|e| classify(e, connection_usage(&program)))?;

        Ok(Self {
            broker: cli.broker,
            connection: cli.connection,
        })
    }
}
