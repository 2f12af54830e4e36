//! Per-user and per-playlist contribution counts from the response cache.
//!
//! Usage: contributions [--response-cache .cache.json] [--structure-data structure.json]

use anyhow::{Context, Result};
use clap::Parser;
use rustc_hash::FxHashMap;
use std::path::PathBuf;

use beatcloud_reorg::cache::{ResponseCache, RESPONSE_CACHE_FILE};
use beatcloud_reorg::config::StructureData;
use beatcloud_reorg::store::{contributions, RecordStore};

#[derive(Parser)]
#[command(name = "contributions")]
#[command(about = "Show how many tracks each user added to each playlist")]
struct Args {
    #[arg(long, default_value = RESPONSE_CACHE_FILE)]
    response_cache: PathBuf,

    /// Structure data, used to show user folder names
    #[arg(long)]
    structure_data: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let catalog = ResponseCache::load(&args.response_cache)?.with_context(|| {
        format!(
            "No response cache at {}; run beatcloud-reorg first",
            args.response_cache.display()
        )
    })?;
    let users: FxHashMap<String, String> = match &args.structure_data {
        Some(path) => StructureData::load(path).context("Failed to load structure data")?.users,
        None => FxHashMap::default(),
    };

    let store = RecordStore::from_map(catalog.tracks);
    let report = contributions(&store, &users);

    println!("{:=<60}", "");
    for user in &report {
        match &user.user_name {
            Some(name) => println!("{} ({}): {} tracks", name, user.user_id, user.total()),
            None => println!("{}: {} tracks", user.user_id, user.total()),
        }
        for (playlist, count) in &user.playlists {
            println!("  {:<40} {:>6}", playlist, count);
        }
    }
    println!("{:=<60}", "");
    println!("{} tracks from {} users", store.len(), report.len());

    Ok(())
}
