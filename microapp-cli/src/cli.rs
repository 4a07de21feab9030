use std::path::PathBuf;

use bytedance_microapp::{AppName, StoreMode};
use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(
    name = "microapp",
    version,
    about = "ByteDance mini-app server tool",
    long_about = "Fetches access tokens, exchanges login codes and generates QR codes for a ByteDance (toutiao / douyin) mini app."
)]
pub struct Args {
    /// TOML configuration file (defaults to <config dir>/microapp/config.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Mini-app id
    #[arg(long, env = "MICROAPP_APP_ID", global = true)]
    pub app_id: Option<String>,

    /// Mini-app secret
    #[arg(long, env = "MICROAPP_APP_SECRET", hide_env_values = true, global = true)]
    pub app_secret: Option<String>,

    /// Where access tokens are cached: auto, shared (redis) or local (file)
    #[arg(long, value_parser = parse_store_mode, global = true)]
    pub store_mode: Option<StoreMode>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the current access token
    Token {
        /// Discard the cached token and fetch a new one
        #[arg(long)]
        refresh: bool,
    },

    /// Exchange a login code for the user's session
    Session {
        /// Code from the client-side login call
        #[arg(long, required_unless_present = "anonymous_code")]
        code: Option<String>,

        /// Anonymous login code
        #[arg(long)]
        anonymous_code: Option<String>,
    },

    /// Generate a QR code image
    Qrcode {
        /// Host app: toutiao, douyin, pipixia or huoshan
        #[arg(long, value_parser = parse_appname)]
        appname: Option<AppName>,

        /// Page to open, with query string
        #[arg(long)]
        path: Option<String>,

        /// Image width in pixels
        #[arg(long)]
        width: Option<u32>,

        /// Draw the app icon in the centre
        #[arg(long)]
        set_icon: bool,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_store_mode(value: &str) -> Result<StoreMode, String> {
    bytedance_microapp::config::parse_store_mode(value).map_err(|e| e.to_string())
}

fn parse_appname(value: &str) -> Result<AppName, String> {
    AppName::parse(value).map_err(|e| e.to_string())
}
