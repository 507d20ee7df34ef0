use anyhow::Result;
use attachment_sorter::cli::{self, Cli, Commands, ProgressReporter};
use attachment_sorter::config::Config;
use attachment_sorter::error::ProcessError;
use clap::Parser;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        eprintln!("\nPara ver la ayuda: attachment-sorter --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Pipeline messages are already printed by the console sinks, so their
    // tracing mirror stays off unless RUST_LOG asks for it
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("attachment_sorter=debug,attachment_sorter::messages=off,warn")
        })
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("attachment_sorter=info,attachment_sorter::messages=off,warn")
        })
    };

    // Log lines go through the same MultiProgress as the bars
    let reporter = ProgressReporter::new();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(reporter.log_writer())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();


    match &cli.command {
        Commands::InitConfig { output, force } => {
            tracing::info!("Generating example configuration file");

            if output.exists() && !force {
                return Err(ProcessError::Config(format!(
                    "Ya existe un archivo de configuración en {:?}. Use --force para sobrescribirlo.",
                    output
                ))
                .into());
            }

            Config::create_example(output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nPlease edit this file to customize your settings.");
            println!("Key settings to review:");
            println!("  - extraction.mailbox_root: Directory holding the .eml mail store");
            println!("  - extraction.mailbox_path: Default mail folder (account\\folder)");
            println!("  - extraction.phrases: Default subject phrases");
            println!("  - classification.*_markers: Name markers for signed/unsigned documents");

            Ok(())
        }

        Commands::Extract(args) => {
            let config = Config::load(&cli.config).await?;
            cli::run_extraction(&cli, args, &config, &reporter).await?;
            Ok(())
        }

        Commands::Classify { folder } => {
            let config = Config::load(&cli.config).await?;
            cli::run_classification(&cli, folder, &config, &reporter).await?;
            Ok(())
        }
    }
}
