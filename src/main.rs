//! mdpdf – command-line Markdown → PDF converter.
//!
//! Usage:
//!   mdpdf <input.md> [-o output.pdf] [-t "My Report"] [-s A4] [-m 40]
//!
//! If `--output` is omitted the PDF is written next to the input file with
//! the same stem (e.g. `report.md` → `report.pdf`).

use std::path::PathBuf;
use std::process;

use clap::Parser;

use mdpdf_forge::pipeline::{convert, ConvertOptions, RendererContext};

#[derive(Parser, Debug)]
#[command(name = "mdpdf", version, about = "Convert a Markdown file to a GitHub-styled PDF")]
struct Cli {
    /// Markdown file to convert (must end in .md)
    input: PathBuf,

    /// Output path (default: same stem as input with .pdf)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Document title in PDF metadata (default: input filename stem)
    #[arg(short, long)]
    title: Option<String>,

    /// Page size: A0-A6, B4, B5, Letter, Legal, Tabloid, Executive
    #[arg(short = 's', long, default_value = "A4")]
    page_size: String,

    /// Uniform page margin in points
    #[arg(short, long, default_value_t = 40)]
    margin: u32,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let options = ConvertOptions {
        input: cli.input,
        output: cli.output,
        title: cli.title,
        page_size: cli.page_size,
        margin: cli.margin as f32,
    };

    let ctx = RendererContext::new();
    match convert(&options, &ctx).await {
        Ok(path) => println!("✓ PDF created: {}", path.display()),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
