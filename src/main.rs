use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

mod shared;
use shared::*;

/// Patch the bot interactions document with per-bot user ID samples
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The bot interactions document to update
    #[arg(short, long, default_value = "data/bot-interactions.json")]
    data: PathBuf,

    /// Patch file, or directory of batch files, mapping slug_id to
    /// userIds and sample_size
    #[arg(short, long)]
    patch: PathBuf,

    /// Apply and report, but leave the document untouched
    #[arg(long, default_value_t = false)]
    dry_run: bool,
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
    let mut document = load_document(&args.data)?;
    let patch = load_patch(&args.patch)?;

    let applied = apply_patch(&mut document.bots, &patch);
    for update in &applied {
        println!(
            "[OK] Updated {}: {} user IDs (sample size: {})",
            update.slug_id, update.updated_count, update.sample_size
        );
    }

    let unmatched = unmatched_slugs(&patch, &applied);
    if !unmatched.is_empty() {
        eprintln!("[WARN] No matching bot for: {}", unmatched.join(", "));
    }

    if args.dry_run {
        println!("\n[DRY RUN] {} left untouched", args.data.display());
    } else {
        save_document(&args.data, &document)?;
        println!("\n[SUCCESS] {} updated!", args.data.display());
    }
    println!("Total updated: {} bots with user ID data", applied.len());
    Ok(())
}
