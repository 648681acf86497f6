//! Command-line interface handling for the Waypoint server.
//!
//! Flags given here override the matching settings of the configuration file.

use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;
use waypoint_cluster::Topology;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Optional override for the process layout
    pub topology: Option<Topology>,
    /// Optional override for the shard tick in milliseconds
    pub tick_ms: Option<u64>,
}

impl CliArgs {
    fn command() -> Command {
        Command::new("Waypoint Server")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Multi-process game server core running every role on one host")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("config.toml"),
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
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("all-in-one")
                    .long("all-in-one")
                    .help("Run every role inside a single process")
                    .action(ArgAction::SetTrue)
                    .conflicts_with_all(["spaces", "games"]),
            )
            .arg(
                Arg::new("spaces")
                    .long("spaces")
                    .value_name("COUNT")
                    .help("Split layout: number of space processes")
                    .value_parser(value_parser!(u16)),
            )
            .arg(
                Arg::new("games")
                    .long("games")
                    .value_name("COUNT")
                    .help("Split layout: number of game processes")
                    .value_parser(value_parser!(u16)),
            )
            .arg(
                Arg::new("tick")
                    .long("tick")
                    .value_name("MS")
                    .help("Idle sleep of a shard between ticks")
                    .value_parser(value_parser!(u64)),
            )
    }

    /// Parses the process arguments. Exits with usage on invalid input.
    pub fn parse() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }

    /// Parses an explicit argument list.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&Self::command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &clap::ArgMatches) -> Self {
        let spaces = matches.get_one::<u16>("spaces").copied();
        let games = matches.get_one::<u16>("games").copied();
        let topology = if matches.get_flag("all-in-one") {
            Some(Topology::AllInOne)
        } else if spaces.is_some() || games.is_some() {
            Some(Topology::Split {
                spaces: spaces.unwrap_or(1),
                games: games.unwrap_or(1),
            })
        } else {
            None
        };

        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.toml")),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            topology,
            tick_ms: matches.get_one::<u64>("tick").copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_leave_the_config_alone() {
        let args = CliArgs::try_parse_from(["waypoint"]).unwrap();
        assert_eq!(args.config_path, PathBuf::from("config.toml"));
        assert!(args.log_level.is_none());
        assert!(args.topology.is_none());
        assert!(!args.json_logs);
    }

    #[test]
    fn process_counts_select_the_split_layout() {
        let args = CliArgs::try_parse_from(["waypoint", "--spaces", "3", "-l", "debug", "--json-logs"]).unwrap();
        assert_eq!(args.topology, Some(Topology::Split { spaces: 3, games: 1 }));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);

        assert!(CliArgs::try_parse_from(["waypoint", "--all-in-one", "--games", "2"]).is_err());
    }
}
