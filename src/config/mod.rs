pub mod toml_config;

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "auction-console")]
#[command(about = "Operator console for a live player auction")]
pub struct CliConfig {
    /// Path to the auction configuration file
    #[arg(short, long, default_value = "configs/auction.toml")]
    pub config: String,

    /// Override the catalog path from the configuration
    #[arg(long)]
    pub catalog: Option<String>,

    /// Override the local state directory
    #[arg(long)]
    pub state_dir: Option<String>,

    /// Override the remote backup URL (enables the remote backup)
    #[arg(long)]
    pub remote_url: Option<String>,

    /// Disable the remote backup even if configured
    #[arg(long)]
    pub no_remote: bool,

    /// Keep state in memory only; nothing is written to disk
    #[arg(long)]
    pub ephemeral: bool,

    /// Seed for the random selector, for rehearsals
    #[arg(long)]
    pub seed: Option<u64>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// Applies command-line overrides on top of the file configuration.
    pub fn apply_to(&self, config: &mut toml_config::AuctionConfig) {
        if let Some(catalog) = &self.catalog {
            config.catalog.path = catalog.clone();
        }
        if let Some(state_dir) = &self.state_dir {
            config.storage.state_dir = state_dir.clone();
        }
        if let Some(url) = &self.remote_url {
            let timeout_ms = config.remote.as_ref().and_then(|r| r.timeout_ms);
            config.remote = Some(toml_config::RemoteConfig {
                enabled: true,
                base_url: url.clone(),
                timeout_ms,
            });
        }
        if self.no_remote {
            if let Some(remote) = config.remote.as_mut() {
                remote.enabled = false;
            }
        }
    }
}
