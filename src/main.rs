use clap::Parser;

use watchbridge::Settings;
use watchbridge::cli::commands::{init, serve};
use watchbridge::cli::{Cli, Commands};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // A missing settings file is fine; defaults apply
    if cli.config.is_none()
        && !matches!(cli.command, Commands::Init { .. })
        && Settings::workspace_root().is_some()
    {
        if let Err(warning) = Settings::check_init() {
            eprintln!("Warning: {warning}");
            eprintln!("Using default configuration for now.");
        }
    }

    let source = cli.config.clone().unwrap_or_else(Settings::config_path);
    let mut config = Settings::load_from(&source).unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        Settings::default()
    });

    match cli.command {
        Commands::Init { force } => {
            init::run_init(force)?;
        }
        Commands::Config => init::run_config(&config, &source)?,
        Commands::Serve(args) => {
            args.apply(&mut config);
            watchbridge::logging::init_with_config(&config.logging);
            serve::run(config).await?;
        }
    }

    Ok(())
}
