use clap::Parser;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tar::Archive;

#[path = "../shared.rs"]
mod shared;
use shared::*;

/// Turn a raw query export into a patch fragment for apply-user-ids
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Query export: a JSON array of result records, or a .tgz archive of
    /// such part-files
    #[arg(short, long)]
    results: PathBuf,

    /// The bot slug the export belongs to
    #[arg(short, long)]
    slug: String,

    /// Keep at most this many IDs; the sample size still counts them all
    #[arg(short, long, default_value_t = 1000)]
    limit: usize,
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
    let results = read_results(&args.results)?;
    let entry = patch_entry_from_results(&results, args.limit);
    eprintln!(
        "[OK] {}: {} valid user IDs in {} records",
        args.slug,
        entry.sample_size,
        results.len()
    );

    let mut patch: Patch = new_hash_map();
    patch.insert(args.slug, entry);
    print!(
        "{}",
        serde_json::to_string_pretty(&patch).expect("Serializing json failed")
    );
    Ok(())
}

/// Large exports come down as a gzipped tar of part-files; small ones as a
/// single JSON array. Part-files are concatenated in archive order.
fn read_results(path: &Path) -> Result<Vec<QueryResult>> {
    if !path.to_string_lossy().ends_with(".tgz") {
        return from_json(path, &read_file(path)?);
    }

    let file = File::open(path).map_err(|source| Error::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let mut results = Vec::new();
    for entry in archive.entries().map_err(|source| Error::FileAccess {
        path: path.to_path_buf(),
        source,
    })? {
        let text = entry
            .and_then(io::read_to_string)
            .map_err(|source| Error::FileAccess {
                path: path.to_path_buf(),
                source,
            })?;
        results.extend(from_json::<Vec<QueryResult>>(path, &text)?);
    }
    Ok(results)
}
