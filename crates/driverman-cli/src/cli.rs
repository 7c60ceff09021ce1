use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Installs WebDriver binaries from a driver catalog",
    arg_required_else_help = true
)]
pub struct Args {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit log events and listings as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Disable progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Configuration file to use instead of the default one
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Proxy for all HTTP requests, e.g. http://proxy.local:3128
    #[arg(short = 'P', long, global = true)]
    pub proxy: Option<String>,

    /// Proxy user, sent after the proxy asks for authentication
    #[arg(long, global = true, requires = "proxy")]
    pub proxy_user: Option<String>,

    #[arg(long, global = true, requires = "proxy_user")]
    pub proxy_password: Option<String>,

    /// Directory the drivers are installed into
    #[arg(long, global = true)]
    pub install_dir: Option<String>,

    /// Scratch directory for downloads and extraction
    #[arg(long, global = true)]
    pub temp_dir: Option<String>,

    /// Driver catalog location (URL or path)
    #[arg(long, global = true)]
    pub repository: Option<String>,

    /// Resolve drivers as if running on this platform
    #[arg(long, global = true, value_parser = ["windows", "mac", "linux"])]
    pub host_platform: Option<String>,

    /// Resolve drivers as if running on a host of this bit width
    #[arg(long, global = true, value_parser = ["32", "64"])]
    pub host_bit: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install drivers, the configured ones when no name is given
    #[clap(name = "install", visible_alias = "i")]
    Install {
        /// Drivers to install
        #[arg(required = false)]
        names: Vec<String>,

        /// Target platform
        #[arg(long, value_parser = ["windows", "mac", "linux"])]
        platform: Option<String>,

        /// Target bit width
        #[arg(long, value_parser = ["32", "64"])]
        bit: Option<String>,

        /// Preferred architecture
        #[arg(long)]
        arch: Option<String>,

        /// Exact version to install
        #[arg(long)]
        version: Option<String>,

        /// Download from this URL instead of consulting the catalog
        #[arg(long)]
        url: Option<String>,

        /// Regular expression selecting the archive entries to install
        #[arg(long)]
        file_match_inside: Option<String>,

        /// Keep downloaded archives in the temp directory
        #[arg(long)]
        keep_downloaded: bool,
    },

    /// List the newest driver builds available for this host
    #[clap(name = "list", visible_alias = "ls")]
    List,

    /// Print the effective configuration
    #[clap(name = "config")]
    Config,
}
