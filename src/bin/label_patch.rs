//! CLI tool for finding product labels and patching their text

use clap::{Parser, Subcommand};
use label_patch::{
    apply_instructions, read_input_to_string, relabel_pdf, scan_labels, ClusterConfig,
    ExtractOptions, LabelPatchError, RelabelOptions,
};
use std::fs;
use std::path::PathBuf;
use std::process;

/// Find product identifier labels in PDFs and white out or replace their text.
#[derive(Debug, Parser)]
#[command(name = "label-patch", about, version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the labels found on every page
    Scan {
        /// Path to the PDF file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print labels as JSON
        #[arg(long)]
        json: bool,

        /// Half-width of the label window
        #[arg(long, default_value_t = 120.0)]
        window_x: f32,

        /// Half-height of the label window
        #[arg(long, default_value_t = 60.0)]
        window_y: f32,
    },

    /// White out a phrase in every label and stamp replacement text
    Relabel {
        /// Path to the PDF file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output PDF path
        #[arg(short, long)]
        output: PathBuf,

        /// Phrase to remove from each label
        #[arg(long)]
        search: String,

        /// Text placed at the bottom of each label
        #[arg(long, default_value = "Made in China")]
        replace: String,

        /// Do not add replacement text
        #[arg(long)]
        no_replace: bool,

        /// Font size of the replacement text
        #[arg(long, default_value_t = 8.0)]
        font_size: f32,
    },

    /// Apply a JSON modification instruction file
    Apply {
        /// Path to the PDF file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// JSON file with `{ "pages": [...] }` instructions
        #[arg(long, value_name = "JSON")]
        instructions: PathBuf,

        /// Output PDF path
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command) {
        log::debug!("failed: {}", e);
        if e.is_input_error() {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("Error: failed to process the document");
        }
        process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), LabelPatchError> {
    match command {
        Commands::Scan {
            file,
            json,
            window_x,
            window_y,
        } => {
            let cluster = ClusterConfig { window_x, window_y };
            let pages = scan_labels(&file, &ExtractOptions::default(), &cluster)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&pages)?);
                return Ok(());
            }

            println!("Label Scan Results");
            println!("==================");
            println!("File: {}", file.display());
            println!();
            for page in &pages {
                println!("Page {}: {} labels", page.page, page.labels.len());
                for label in &page.labels {
                    println!(
                        "  {:<14} x={:7.1} y={:7.1} w={:7.1} h={:7.1} items={}",
                        label.anchor.text.trim(),
                        label.bbox.x,
                        label.bbox.y,
                        label.bbox.width,
                        label.bbox.height,
                        label.items.len()
                    );
                }
            }
            Ok(())
        }
        Commands::Relabel {
            file,
            output,
            search,
            replace,
            no_replace,
            font_size,
        } => {
            let opts = RelabelOptions {
                search_text: search,
                replacement_text: (!no_replace).then_some(replace),
                font_size,
                ..Default::default()
            };
            let result = relabel_pdf(&file, &opts)?;
            fs::write(&output, &result.pdf)?;

            for page in &result.pages {
                println!(
                    "Page {}: {} labels, {} areas removed, {} texts added",
                    page.page, page.labels, page.areas_removed, page.texts_added
                );
            }
            println!("Processing time: {}ms", result.processing_time_ms);
            println!("Written to: {}", output.display());
            Ok(())
        }
        Commands::Apply {
            file,
            instructions,
            output,
        } => {
            let payload = read_input_to_string(&instructions)?;
            let pdf = apply_instructions(&file, &payload)?;
            fs::write(&output, &pdf)?;
            println!("Written to: {}", output.display());
            Ok(())
        }
    }
}
