//! Command-line interface handling for the position server.
//!
//! Flags given here override the matching values of the configuration file.

use clap::{value_parser, Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Optional override for the number of simulated players
    pub players: Option<usize>,
    /// Optional override for the trigger radius
    pub radius: Option<f64>,
}

/// Builds the clap command describing every supported flag.
pub fn command() -> Command {
    Command::new("position-server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Shared-area position server with proximity triggers")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("position.toml"),
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
        .arg(
            Arg::new("players")
                .short('n')
                .long("players")
                .value_name("COUNT")
                .help("Number of simulated players placed at random")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("radius")
                .short('r')
                .long("radius")
                .value_name("RADIUS")
                .help("Trigger radius in area units")
                .value_parser(value_parser!(f64)),
        )
}

impl CliArgs {
    /// Parses the process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("position.toml")),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            players: matches.get_one::<usize>("players").copied(),
            radius: matches.get_one::<f64>("radius").copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let matches = command().try_get_matches_from(["position-server"]).unwrap();
        let args = CliArgs::from_matches(&matches);

        assert_eq!(args.config_path, PathBuf::from("position.toml"));
        assert_eq!(args.log_level, None);
        assert!(!args.json_logs);
        assert_eq!(args.players, None);
        assert_eq!(args.radius, None);
    }

    #[test]
    fn test_overrides() {
        let matches = command()
            .try_get_matches_from([
                "position-server",
                "-c",
                "stage.toml",
                "--log-level",
                "debug",
                "--json-logs",
                "-n",
                "8",
                "--radius",
                "0.25",
            ])
            .unwrap();
        let args = CliArgs::from_matches(&matches);

        assert_eq!(args.config_path, PathBuf::from("stage.toml"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
        assert_eq!(args.players, Some(8));
        assert_eq!(args.radius, Some(0.25));
    }

    #[test]
    fn test_rejects_non_numeric_radius() {
        assert!(command()
            .try_get_matches_from(["position-server", "--radius", "wide"])
            .is_err());
    }
}
