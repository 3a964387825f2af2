use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::hash::BuildHasherDefault;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub type HashMap<A, B> = std::collections::HashMap<A, B, BuildHasherDefault<rustc_hash::FxHasher>>;
pub type HashSet<A> = std::collections::HashSet<A, BuildHasherDefault<rustc_hash::FxHasher>>;

pub fn new_hash_map<A, B>() -> HashMap<A, B> {
    rustc_hash::FxHashMap::default()
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to access {}: {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not valid JSON: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Well-formed JSON of the wrong shape, caught before anything is
    /// mutated: a `bots` value that is not an array of records, patch
    /// `userIds` that are not strings, and the like.
    #[error("unexpected shape in {}: {message}", .path.display())]
    Validation { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

fn file_access(path: &Path, source: io::Error) -> Error {
    Error::FileAccess {
        path: path.to_path_buf(),
        source,
    }
}

/// One entry of the document's `bots` array. Only the fields this tool
/// rewrites are typed; whatever else the app keeps on a bot rides along
/// in `rest` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotRecord {
    pub slug_id: String,

    #[serde(rename = "userIds", skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<String>>,

    #[serde(rename = "userIdsSampleSize", skip_serializing_if = "Option::is_none")]
    pub user_ids_sample_size: Option<u64>,

    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// The whole `data/bot-interactions.json` document. Loaded and written
/// wholesale, never partially.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotDocument {
    pub bots: Vec<BotRecord>,

    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// What a patch does to one bot. The on-disk spelling is `sample_size`,
/// but `sampleSize` is accepted too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchEntry {
    #[serde(rename = "userIds")]
    pub user_ids: Vec<String>,

    #[serde(rename = "sample_size", alias = "sampleSize")]
    pub sample_size: u64,
}

pub type Patch = HashMap<String, PatchEntry>;

/// Report row for one applied update.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedUpdate {
    pub slug_id: String,
    pub updated_count: usize,
    pub sample_size: u64,
}

/// Overwrite `userIds` and `userIdsSampleSize` on every record whose
/// `slug_id` has a patch entry. Full replacement, no merging with what
/// was there before. Records without an entry are left alone, and patch
/// slugs that match nothing are simply never applied. Iteration follows
/// document order.
pub fn apply_patch(bots: &mut [BotRecord], patch: &Patch) -> Vec<AppliedUpdate> {
    let mut applied = Vec::with_capacity(patch.len());
    for bot in bots.iter_mut() {
        if let Some(entry) = patch.get(&bot.slug_id) {
            bot.user_ids = Some(entry.user_ids.clone());
            bot.user_ids_sample_size = Some(entry.sample_size);
            applied.push(AppliedUpdate {
                slug_id: bot.slug_id.clone(),
                updated_count: entry.user_ids.len(),
                sample_size: entry.sample_size,
            });
        }
    }
    applied
}

/// Patch slugs that matched no record, sorted for stable output.
pub fn unmatched_slugs(patch: &Patch, applied: &[AppliedUpdate]) -> Vec<String> {
    let matched: HashSet<&str> = applied.iter().map(|update| update.slug_id.as_str()).collect();
    patch
        .keys()
        .filter(|slug| !matched.contains(slug.as_str()))
        .cloned()
        .sorted()
        .collect()
}

/// One raw record of an upstream query export. The export carries a lot
/// of columns; only the identifier matters here.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryResult {
    #[serde(rename = "auth.userId", default)]
    pub user_id: Option<String>,
}

/// The first rows of an export are usually anonymous or empty; keep only
/// rows with a non-empty identifier. No deduplication, order preserved.
pub fn filter_valid_ids(results: &[QueryResult]) -> impl Iterator<Item = &str> + '_ {
    results
        .iter()
        .filter_map(|result| result.user_id.as_deref())
        .filter(|id| !id.is_empty())
}

/// Collapse an export into a patch entry. The sample size counts every
/// valid record even when the ID list itself is capped at `limit`.
pub fn patch_entry_from_results(results: &[QueryResult], limit: usize) -> PatchEntry {
    PatchEntry {
        sample_size: filter_valid_ids(results).count() as u64,
        user_ids: filter_valid_ids(results)
            .take(limit)
            .map(str::to_string)
            .collect(),
    }
}

pub fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| file_access(path, source))
}

/// Two-stage parse so the caller can tell garbled JSON from JSON of the
/// wrong shape.
pub fn from_json<T: serde::de::DeserializeOwned>(path: &Path, text: &str) -> Result<T> {
    let value: Value = serde_json::from_str(text).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_value(value).map_err(|err| Error::Validation {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

pub fn load_document(path: &Path) -> Result<BotDocument> {
    from_json(path, &read_file(path)?)
}

/// Pretty-printed UTF-8, 2-space indent, non-ASCII kept as-is. The write
/// goes through a temp file in the same directory and an atomic rename,
/// so a failed run never leaves a truncated document behind.
pub fn save_document(path: &Path, document: &BotDocument) -> Result<()> {
    let text = serde_json::to_string_pretty(document).expect("Serializing json failed");
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = tempfile::NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))
        .map_err(|source| file_access(path, source))?;
    tmp.write_all(text.as_bytes())
        .map_err(|source| file_access(path, source))?;
    tmp.persist(path)
        .map_err(|err| file_access(path, err.error))?;
    Ok(())
}

/// A patch is either a single JSON file or a directory of batch files
/// (the upstream data always arrives in hand-sized batches). Batches are
/// parsed in parallel and merged in filename order, so a later batch
/// overrides an earlier one for the same slug.
pub fn load_patch(path: &Path) -> Result<Patch> {
    if !path.is_dir() {
        return from_json(path, &read_file(path)?);
    }

    let mut batch_paths = Vec::new();
    for entry in WalkDir::new(path).min_depth(1) {
        let entry = entry.map_err(|err| file_access(path, err.into()))?;
        let entry_path = entry.into_path();
        if entry_path.extension().map_or(false, |ext| ext == "json") {
            batch_paths.push(entry_path);
        }
    }
    batch_paths.sort();

    let batches: Vec<Result<Patch>> = batch_paths
        .par_iter()
        .map(|batch| read_file(batch).and_then(|text| from_json(batch, &text)))
        .collect();

    let mut patch = new_hash_map();
    for batch in batches {
        patch.extend(batch?);
    }
    Ok(patch)
}
