mod cli;

use clap::Parser;

use strata_core::commands;
use strata_core::config::StoreConfig;

use cli::{Cli, Command};

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = match StoreConfig::load(&cli.config_file) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(
        path = %config.path.display(),
        retention = config.retention,
        "store configured"
    );

    let result = match &cli.command {
        Command::Write {
            input_file,
            apply_arrangement,
        } => commands::write::run(&config, input_file, *apply_arrangement).map(|stats| {
            println!(
                "version {} written: {} bytes, {} chunks, dedup ratio {:.2}",
                stats.version,
                stats.file_bytes,
                stats.chunks,
                stats.dedup_ratio()
            );
        }),

        Command::Restore {
            restore_version,
            restore_path,
        } => commands::restore::run(&config, *restore_version, restore_path).map(|stats| {
            println!(
                "version {} restored: {} bytes from {} sources",
                stats.version, stats.output_bytes, stats.sources
            );
        }),

        Command::Delete => commands::delete::run(&config).map(|stats| {
            println!(
                "earliest version eliminated ({} categories renamed, {} volumes shifted)",
                stats.categories_renamed, stats.volumes_shifted
            );
        }),

        Command::Status => commands::status::run(&config).map(|manifest| {
            println!("{} versions stored", manifest.total_version);
            println!(
                "arrangement {} versions behind",
                manifest.arrangement_fall_behind
            );
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
