//! Command-line interface handling for the crosstalk peer simulator.
//!
//! Every option overrides the matching value from the configuration file.

use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the channel identifier
    pub channel: Option<String>,
    /// Optional override for the number of peers
    pub peers: Option<usize>,
    /// Optional override for the event name
    pub event: Option<String>,
    /// Optional override for the payload (JSON text)
    pub payload: Option<String>,
    /// Optional override for the number of messages sent
    pub count: Option<u32>,
    /// Whether to send the payload base64-encoded
    pub binary: bool,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    /// Parses the process arguments.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    /// Parses an explicit argument list (the first item is the binary name).
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("crosstalk.toml")),
            channel: matches.get_one::<String>("channel").cloned(),
            peers: matches.get_one::<usize>("peers").copied(),
            event: matches.get_one::<String>("event").cloned(),
            payload: matches.get_one::<String>("payload").cloned(),
            count: matches.get_one::<u32>("count").copied(),
            binary: matches.get_flag("binary"),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}

fn command() -> Command {
    Command::new("crosstalk")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Opens several peers on one broadcast channel and exchanges events between them")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("crosstalk.toml"),
        )
        .arg(
            Arg::new("channel")
                .long("channel")
                .value_name("ID")
                .help("Channel identifier shared by all peers"),
        )
        .arg(
            Arg::new("peers")
                .short('n')
                .long("peers")
                .value_name("N")
                .help("Number of peers to open (at least 2)")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("event")
                .short('e')
                .long("event")
                .value_name("NAME")
                .help("Event name to send"),
        )
        .arg(
            Arg::new("payload")
                .short('p')
                .long("payload")
                .value_name("JSON")
                .help("Payload to send, as JSON text"),
        )
        .arg(
            Arg::new("count")
                .long("count")
                .value_name("N")
                .help("Number of messages the first peer sends")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("binary")
                .long("binary")
                .help("Carry the payload as base64-encoded bytes")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(clap::ArgAction::SetTrue),
        )
}
