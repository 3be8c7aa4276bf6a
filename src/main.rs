//! PDF Signer CLI
//!
//! Command-line interface for placing a signature and dates on a PDF.

use anyhow::{bail, Context};
use clap::Parser;
use sign_pdf::file_ops::{sign_pdf_file, SigningPlan};
use sign_pdf::{date, AnnotatorConfig, ExportOptions, ViewerPoint, ViewerSize, OUTPUT_FILE_NAME};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Place a signature image and date stamps on a PDF.
///
/// Positions are in viewer pixels: pages stacked top to bottom, each scaled
/// by the zoom factor, origin at the top-left of the first page.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input PDF file path
    #[arg(short, long)]
    input: PathBuf,

    /// Output PDF file path
    #[arg(short, long, default_value = OUTPUT_FILE_NAME)]
    output: PathBuf,

    /// Zoom factor the positions were measured at
    #[arg(short, long, default_value = "1.5")]
    zoom: f64,

    /// Signature image (PNG)
    #[arg(short, long)]
    signature: Option<PathBuf>,

    /// Top-left corner of the signature, as X,Y
    #[arg(long, value_parser = parse_point, default_value = "0,0")]
    signature_at: ViewerPoint,

    /// Signature box size, as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size)]
    signature_size: Option<ViewerSize>,

    /// Place a date at X,Y (repeatable)
    #[arg(long = "date-at", value_parser = parse_point)]
    dates: Vec<ViewerPoint>,

    /// Date text to stamp (defaults to today, dd-mm-yyyy)
    #[arg(long)]
    date: Option<String>,

    /// Place free text, as X,Y:TEXT (repeatable)
    #[arg(long = "text", value_parser = parse_text)]
    texts: Vec<(ViewerPoint, String)>,

    /// Font size for dates and text, in points
    #[arg(long, default_value = "12")]
    font_size: f64,

    /// Compress PDF streams (reduces file size)
    #[arg(short, long, default_value_t = true, action = clap::ArgAction::Set)]
    compress_streams: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_pair(s: &str, sep: char) -> Result<(f64, f64), String> {
    let (a, b) = s
        .split_once(sep)
        .ok_or_else(|| format!("expected two numbers separated by '{}'", sep))?;
    let number = |part: &str| -> Result<f64, String> {
        let value = part.trim().parse::<f64>().map_err(|e| e.to_string())?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(format!("{:?} is not a finite number", part.trim()))
        }
    };
    Ok((number(a)?, number(b)?))
}

fn parse_point(s: &str) -> Result<ViewerPoint, String> {
    parse_pair(s, ',').map(|(x, y)| ViewerPoint::new(x, y))
}

fn parse_size(s: &str) -> Result<ViewerSize, String> {
    parse_pair(s, 'x').map(|(w, h)| ViewerSize::new(w, h))
}

fn parse_text(s: &str) -> Result<(ViewerPoint, String), String> {
    let (point, text) = s
        .split_once(':')
        .ok_or_else(|| "expected X,Y:TEXT".to_string())?;
    Ok((parse_point(point)?, text.to_string()))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if args.signature.is_none() && args.dates.is_empty() && args.texts.is_empty() {
        bail!("nothing to place: pass --signature, --date-at or --text");
    }

    let config = AnnotatorConfig {
        zoom: args.zoom,
        export: ExportOptions {
            font_size: args.font_size,
            compress_streams: args.compress_streams,
            ..ExportOptions::default()
        },
        ..AnnotatorConfig::default()
    };

    let signature_png = args
        .signature
        .as_ref()
        .map(|path| std::fs::read(path).with_context(|| format!("reading {:?}", path)))
        .transpose()?;

    let date_text = args.date.clone().unwrap_or_else(date::today);
    let mut texts: Vec<(ViewerPoint, String)> =
        args.dates.iter().map(|p| (*p, date_text.clone())).collect();
    texts.extend(args.texts.iter().cloned());

    let plan = SigningPlan {
        signature_png,
        signature_at: args.signature_at,
        signature_size: args.signature_size,
        texts,
    };

    println!("PDF Signer");
    println!("==========");

    let report = sign_pdf_file(&args.input, &args.output, config, &plan)?;

    for warning in &report.warnings {
        println!("Warning: {}", warning);
    }
    println!(
        "\nDone! Drew {} image(s) and {} text overlay(s)",
        report.images_drawn, report.texts_drawn
    );
    println!("Output saved to: {:?}", args.output);

    Ok(())
}
