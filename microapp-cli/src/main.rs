mod cli;
mod config;

use std::process;

use anyhow::{Context, Result};
use bytedance_microapp::{MiniAppClient, QrCodeOptions};
use clap::Parser;
use tracing::{Level, debug, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::cli::{Args, Commands};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("Application error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    if let Commands::Completions { shell } = args.command {
        use clap::CommandFactory;
        use clap_complete::generate;

        let mut cmd = Args::command();
        let bin_name = cmd.get_name().to_string();
        generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
        return Ok(());
    }

    init_logging(args.verbose, args.quiet);

    let config = config::load(&args)?;
    let client = MiniAppClient::new(config).await?;
    debug!(store = client.credentials().store_name(), "Client ready");

    match args.command {
        Commands::Token { refresh } => {
            if refresh {
                client.credentials().invalidate().await?;
            }
            println!("{}", client.access_token().await?);
        }

        Commands::Session {
            code,
            anonymous_code,
        } => {
            let session = client
                .code_to_session(code.as_deref(), anonymous_code.as_deref())
                .await?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }

        Commands::Qrcode {
            appname,
            path,
            width,
            set_icon,
            output,
        } => {
            let options = QrCodeOptions {
                appname,
                path,
                width,
                set_icon: set_icon.then_some(true),
                ..Default::default()
            };
            let qrcode = client.create_qrcode(&options).await?;
            tokio::fs::write(&output, &qrcode.data)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!(
                "Wrote {} bytes ({}) to {}",
                qrcode.data.len(),
                qrcode.content_type,
                output.display()
            );
        }

        // Generated before any configuration is loaded.
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    // Logs go to stderr so stdout stays clean for piping tokens and JSON.
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(verbose),
        )
        .init();
}
