//! keymatch CLI entry point

use clap::Parser;
use keymatch::config::{Cli, Settings};
use keymatch::pipeline;
use keymatch::types::PipelineResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli);

    // Validate inputs
    if let Err(e) = validate_inputs(&cli) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    // Build settings from CLI
    let settings = Settings::from_cli(&cli);

    // Run the pipeline
    match pipeline::run(&settings) {
        Ok(PipelineResult::Completed(report)) => {
            println!();
            println!("Beat key:   {} ({})", report.beat_key.standard_notation(), report.beat_key.camelot);
            println!("Vocals key: {} ({})", report.vocals_key.standard_notation(), report.vocals_key.camelot);
            println!(
                "Result:     {} (score {:.0}/100)",
                if report.comparison.is_match { "MATCH" } else { "NO MATCH" },
                report.comparison.score
            );
            ExitCode::SUCCESS
        }
        Ok(PipelineResult::Failed { stage, reason }) => {
            eprintln!("Pipeline failed at {}: {}", stage.tag(), reason);
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("Fatal error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = if cli.quiet { "error" } else { filter };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

fn validate_inputs(cli: &Cli) -> Result<(), String> {
    for (label, path) in [("Karaoke recording", &cli.karaoke), ("Backing track", &cli.backing)] {
        if !path.exists() {
            return Err(format!(
                "{} does not exist: {}\n\n  Tip: Check the path is correct and accessible.\n  Example:\n    keymatch take.wav backing.mp3 -o ./results",
                label,
                path.display()
            ));
        }
        if !path.is_file() {
            return Err(format!("{} is not a file: {}", label, path.display()));
        }
    }

    if cli.window_duration <= 0.0 {
        return Err(format!(
            "Window duration must be positive, got {}",
            cli.window_duration
        ));
    }

    // The output dir itself is created automatically, but its parent must exist
    if let Some(parent) = cli.output.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(format!(
                "Output parent directory does not exist: {}\n\n  Tip: The output directory will be created automatically,\n  but its parent directory must exist.\n  Example: mkdir -p {}",
                parent.display(),
                parent.display()
            ));
        }
    }

    Ok(())
}
