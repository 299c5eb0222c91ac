mod commands;
mod output;

use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "envelope",
    version,
    about = "Turn land-title PDFs into envelope mail-merge documents"
)]
struct Cli {
    /// Land-title PDF files; each produces its own .docx next to it
    #[arg(required = true, value_name = "PDF")]
    inputs: Vec<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let failed = match commands::convert::run(&cli.inputs) {
        Ok(failed) => failed,
        Err(e) => {
            eprintln!("Error: {e}");
            cli.inputs.len()
        }
    };

    println!("Press Enter to exit...");
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);

    if failed > 0 {
        std::process::exit(1);
    }
}
