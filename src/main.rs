mod archive;
mod cli;
mod client;
mod commands;
mod error;
mod input;
mod options;
mod pending;
mod pipeline;
mod progress;
mod resources;
mod results;
mod round;
mod utils;
mod widget;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::cli::TargetFormat;
use crate::client::ConverterClient;
use crate::commands::{ImageJob, Settings};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the conversion backend
    #[arg(long, env = "RCONV_SERVER", default_value = "http://127.0.0.1:8000", global = true)]
    server: String,

    /// Settings file for the remembered conversion options
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Do not read or write remembered options
    #[arg(long, global = true)]
    no_persist: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a batch of images in one request
    Images {
        /// Files or glob patterns to convert
        files: Vec<String>,

        /// Files or folders dropped onto the converter
        #[arg(long = "drop")]
        drop: Vec<PathBuf>,

        /// Read one pasted image from stdin
        #[arg(long)]
        paste: bool,

        /// Output format (defaults to the remembered one)
        #[arg(short = 'f', long, value_enum)]
        format: Option<TargetFormat>,

        /// Output quality 1-100 (defaults to the remembered one)
        #[arg(short = 'q', long, value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: Option<u8>,

        /// Directory to save converted files
        #[arg(short = 'o', long, default_value = "converted")]
        output: PathBuf,

        /// Also save the raw archive
        #[arg(long)]
        keep_archive: bool,
    },

    /// Convert a DOCX document to PDF
    Docx {
        file: PathBuf,

        #[arg(short = 'o', long, default_value = "converted")]
        output: PathBuf,
    },

    /// Resize one image
    Resize {
        file: PathBuf,

        #[arg(short = 'W', long)]
        width: Option<u32>,

        #[arg(short = 'H', long)]
        height: Option<u32>,

        #[arg(short = 'o', long, default_value = "converted")]
        output: PathBuf,
    },

    /// Convert a quantity between units (e.g. 3 km mile)
    Units {
        #[arg(allow_negative_numbers = true)]
        value: f64,
        from: String,
        to: String,
    },

    /// Convert an amount between currencies (e.g. 10 usd eur)
    Currency {
        value: f64,
        from: String,
        to: String,
    },

    /// Show or change the remembered conversion options
    Options {
        #[arg(short = 'f', long, value_enum)]
        format: Option<TargetFormat>,

        #[arg(short = 'q', long, value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: Option<u8>,
    },

    /// Interactive session: stage, remove and convert files across rounds
    Session {
        #[arg(short = 'o', long, default_value = "converted")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("RCONV_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let settings = Settings {
        path: args.settings.clone(),
        persist: !args.no_persist,
    };

    // Options only touches local storage; no runtime needed
    if let Command::Options { format, quality } = args.command {
        return crate::commands::run_options(settings, format, quality);
    }

    let client = ConverterClient::new(&args.server)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        match args.command {
            Command::Images {
                files,
                drop,
                paste,
                format,
                quality,
                output,
                keep_archive,
            } => {
                crate::commands::run_images(
                    client,
                    settings,
                    ImageJob {
                        files,
                        drop,
                        paste,
                        format,
                        quality,
                        output,
                        keep_archive,
                    },
                )
                .await
            }
            Command::Docx { file, output } => crate::commands::run_docx(client, file, output).await,
            Command::Resize {
                file,
                width,
                height,
                output,
            } => crate::commands::run_resize(client, file, width, height, output).await,
            Command::Units { value, from, to } => crate::commands::run_units(client, value, from, to).await,
            Command::Currency { value, from, to } => crate::commands::run_currency(client, value, from, to).await,
            Command::Session { output } => crate::commands::run_session(client, settings, output).await,
            Command::Options { .. } => Ok(()),
        }
    })
}
