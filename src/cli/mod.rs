use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "scenefinder-relay",
    about = "SceneFinder relay - extract audio from YouTube and Instagram videos and forward it as MP3",
    version,
    long_about = "An HTTP service that takes a YouTube or Instagram video URL, fetches the media, transcodes the audio to a size-capped MP3 and uploads it to a downstream processing endpoint. Runs the server when no subcommand is given."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (YAML); environment variables override its values
    #[arg(short, long, global = true, env = "SCENEFINDER_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Port to listen on (overrides PORT and the config file)
        #[arg(short, long, value_name = "PORT")]
        port: Option<u16>,
    },

    /// Show the effective configuration or write a default config file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List supported platforms
    Sources,
}

impl Cli {
    /// The subcommand to run; a bare invocation serves
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve { port: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_invocation_serves() {
        let cli = Cli::try_parse_from(["scenefinder-relay"]).unwrap();
        assert_eq!(cli.command(), Commands::Serve { port: None });
    }

    #[test]
    fn test_serve_with_port_and_global_flags() {
        let cli = Cli::try_parse_from([
            "scenefinder-relay",
            "serve",
            "--port",
            "9000",
            "--verbose",
            "--config",
            "relay.yaml",
        ])
        .unwrap();

        assert_eq!(cli.command(), Commands::Serve { port: Some(9000) });
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("relay.yaml")));
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(Cli::try_parse_from(["scenefinder-relay", "serve", "--port", "99999"]).is_err());
    }
}
