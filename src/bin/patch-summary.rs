use clap::Parser;
use itertools::Itertools;
use std::path::PathBuf;
use std::process::ExitCode;

#[path = "../shared.rs"]
mod shared;
use shared::*;

/// Show what a patch would update, without touching the bot document
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Patch file, or directory of batch files
    #[arg(short, long)]
    patch: PathBuf,
}

fn main() -> ExitCode {
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let patch = load_patch(&args.patch)?;
    for (slug, entry) in patch.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
        println!(
            "{}: {} user IDs (sample size: {})",
            slug,
            entry.user_ids.len(),
            entry.sample_size
        );
    }
    println!("\n{} bots in patch", patch.len());
    Ok(())
}
