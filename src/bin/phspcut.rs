//! phspcut - phase-space window cutter CLI
//!
//! Command-line interface for filtering IAEA phase-space files by where
//! particle tracks cross a plane.

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use phsp_cutter::error::Result;
use phsp_cutter::pipeline::{cut_phase_space, FilterConfig, SizeCheckPolicy};
use phsp_cutter::stream::{IaeaSource, RecordSource, SizeCheck};
use std::path::PathBuf;

/// Phase-space window cutter
#[derive(Parser)]
#[command(name = "phspcut")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep only particles whose track crosses the window plane inside the window
    Cut {
        /// Input file base name (without .IAEAheader/.IAEAphsp)
        input: PathBuf,

        /// Output file base name (without .IAEAheader/.IAEAphsp)
        output: PathBuf,

        /// Path to filter configuration YAML (default: z = 100 cm, 14 x 14 cm window)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Continue when the record file size disagrees with the header checksum
        #[arg(long)]
        tolerate_size_mismatch: bool,

        /// Override the number of unreadable records tolerated before aborting
        #[arg(long)]
        error_threshold: Option<i64>,
    },

    /// Show the header of a phase-space file
    Inspect {
        /// Input file base name (without .IAEAheader/.IAEAphsp)
        input: PathBuf,

        /// Output format: text, json, or yaml
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Generate an example filter configuration
    Example {
        /// Output path for the example YAML
        #[arg(short, long, default_value = "filter.yaml")]
        output: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Cut {
            input,
            output,
            config,
            tolerate_size_mismatch,
            error_threshold,
        } => cmd_cut(
            &input,
            &output,
            config.as_ref(),
            tolerate_size_mismatch,
            error_threshold,
        ),

        Commands::Inspect { input, format } => cmd_inspect(&input, &format),

        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Run the window cut
fn cmd_cut(
    input: &PathBuf,
    output: &PathBuf,
    config_path: Option<&PathBuf>,
    tolerate_size_mismatch: bool,
    error_threshold: Option<i64>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => {
            eprintln!("Loading filter configuration from {:?}...", path);
            FilterConfig::from_file(path)?
        }
        None => FilterConfig::default(),
    };
    if tolerate_size_mismatch {
        config.size_check = SizeCheckPolicy::WarnOnSizeMismatch;
    }
    if let Some(threshold) = error_threshold {
        config.error_threshold = threshold;
    }

    let summary = cut_phase_space(input, output, &config)?;

    eprintln!();
    eprint!("{}", summary.result);
    if let Some(bytes) = summary.output_bytes {
        eprintln!("  Output file size:   {} bytes", bytes);
    }
    if let Some(reason) = &summary.header_error {
        eprintln!("Error updating output header: {}", reason);
    }
    eprintln!(
        "Filtering complete: {} of {} expected records kept ({:.2}%)",
        summary.result.accepted,
        summary.expected_records,
        summary.result.acceptance() * 100.0
    );

    Ok(())
}

/// Print a header summary
fn cmd_inspect(input: &PathBuf, format: &str) -> Result<()> {
    let source = IaeaSource::open(input)?;
    let header = source.header();
    let check = source.check_size_and_byte_order()?;
    let check_text = match &check {
        SizeCheck::Ok => "ok".to_string(),
        SizeCheck::Mismatch(m) => format!("mismatch (code {}): {}", m.code(), m),
    };

    match format {
        "json" | "yaml" => {
            let profile = serde_json::json!({
                "title": header.title,
                "particles": header.particles,
                "orig_histories": header.orig_histories,
                "record_length": header.record_length,
                "byte_order": header.byte_order,
                "checksum": header.checksum,
                "counts": header.counts,
                "contents": header.contents,
                "size_check": check_text,
            });
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&profile)?);
            } else {
                println!("{}", serde_yaml::to_string(&profile)?);
            }
        }
        _ => {
            println!("Phase-Space Header");
            println!("==================");
            println!();
            for line in &header.title {
                println!("  {}", line);
            }
            println!();
            println!("Records:");
            println!("  Particles:        {}", header.particles);
            println!("  Orig. histories:  {}", header.orig_histories);
            println!("  Record length:    {} bytes", header.record_length);
            println!("  Byte order:       {}", header.byte_order);
            println!(
                "  Extra fields:     {} floats, {} longs",
                header.contents.n_extra_floats(),
                header.contents.n_extra_longs()
            );
            println!();
            println!("Species:");
            println!("  Photons:   {}", header.counts.photons);
            println!("  Electrons: {}", header.counts.electrons);
            println!("  Positrons: {}", header.counts.positrons);
            println!("  Neutrons:  {}", header.counts.neutrons);
            println!("  Protons:   {}", header.counts.protons);
            println!();
            println!("Size check: {}", check_text);
        }
    }

    Ok(())
}

/// Write an example configuration
fn cmd_example(output_path: &PathBuf) -> Result<()> {
    let config = FilterConfig {
        name: "example-window".to_string(),
        description: Some("14 x 14 cm window at z = 100 cm".to_string()),
        ..Default::default()
    };
    let yaml = config.to_yaml()?;

    std::fs::write(output_path, &yaml)?;
    eprintln!("Wrote example configuration to {:?}", output_path);
    eprintln!();
    eprintln!("Contents:");
    println!("{}", yaml);

    Ok(())
}
