//! Clap derive structures for `deconz-syncd`.

use std::path::PathBuf;

use clap::Parser;

/// deconz-syncd -- keep deCONZ gateways synchronized
#[derive(Debug, Parser)]
#[command(
    name = "deconz-syncd",
    version,
    about = "Keep deCONZ gateways synchronized",
    long_about = "Polls each configured deCONZ gateway, follows its push stream,\n\
        and logs device lifecycle changes until interrupted."
)]
pub struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, short = 'c', env = "DECONZ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Only run the named gateway profile
    #[arg(long, short = 'g', conflicts_with = "host")]
    pub gateway: Option<String>,

    /// Run a single gateway at this host instead of the configured profiles
    #[arg(long, env = "DECONZ_HOST")]
    pub host: Option<String>,

    /// API key for --host
    #[arg(long, env = "DECONZ_API_KEY", hide_env = true, requires = "host")]
    pub api_key: Option<String>,

    /// Poll only; do not open the push stream
    #[arg(long)]
    pub no_stream: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn verbosity_counts() {
        let cli = Cli::try_parse_from(["deconz-syncd", "-vv", "--json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.json);
        assert!(cli.host.is_none());
    }

    #[test]
    fn api_key_needs_host() {
        assert!(Cli::try_parse_from(["deconz-syncd", "--api-key", "ABC"]).is_err());
        let cli = Cli::try_parse_from(["deconz-syncd", "--host", "10.0.0.2", "--api-key", "ABC"])
            .unwrap();
        assert_eq!(cli.api_key.as_deref(), Some("ABC"));
    }

    #[test]
    fn gateway_and_host_conflict() {
        assert!(
            Cli::try_parse_from(["deconz-syncd", "-g", "home", "--host", "10.0.0.2"]).is_err()
        );
    }
}
