use std::path::PathBuf;

use clap::{Parser, Subcommand};

use pingwatch::config::DEFAULT_CONFIG_PATH;

#[derive(Parser, Debug)]
#[command(
    name = "pingwatch",
    version,
    about = "Watch host reachability and report up/down changes to Telegram"
)]
pub struct Args {
    /// Configuration file.
    #[arg(short, long, env = "PINGWATCH_CONFIG", default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Errors only.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the monitoring service (default).
    Run {
        /// Start without checking the Telegram bot credentials.
        #[arg(long)]
        skip_verify: bool,
    },

    /// Probe every host once and print the result.
    Check,

    /// Verify the Telegram bot and send a test message.
    TestNotify,
}

impl Args {
    pub fn subcommand(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or(Commands::Run { skip_verify: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_run() {
        let args = Args::try_parse_from(["pingwatch"]).unwrap();
        assert!(matches!(args.subcommand(), Commands::Run { skip_verify: false }));
        assert!(!args.verbose);
    }

    #[test]
    fn parses_subcommands() {
        let args =
            Args::try_parse_from(["pingwatch", "--config", "/etc/pw.toml", "run", "--skip-verify"])
                .unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/pw.toml"));
        assert!(matches!(args.subcommand(), Commands::Run { skip_verify: true }));

        let args = Args::try_parse_from(["pingwatch", "check", "-v"]).unwrap();
        assert!(matches!(args.subcommand(), Commands::Check));
        assert!(args.verbose);

        let args = Args::try_parse_from(["pingwatch", "test-notify"]).unwrap();
        assert!(matches!(args.subcommand(), Commands::TestNotify));
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Args::try_parse_from(["pingwatch", "-v", "-q"]).is_err());
    }
}
