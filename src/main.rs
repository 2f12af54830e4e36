use anyhow::{bail, Context, Result};
use clap::Parser;
use rustc_hash::FxHashSet;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use beatcloud_reorg::cache::{DecisionCache, ResponseCache, FUZZ_CACHE_FILE, RESPONSE_CACHE_FILE};
use beatcloud_reorg::config::{RunOptions, Settings, StructureData, DEFAULT_FUZZ_RATIO};
use beatcloud_reorg::engine::{fetch_catalog, log_fuzzy_matches, log_unmatched, place, reconcile, RunContext};
use beatcloud_reorg::fsops::{find_local_files, Commit, DryRun, MoveExecutor, MusicDirProbe};
use beatcloud_reorg::inventory::S3Inventory;
use beatcloud_reorg::pool::WorkerPool;
use beatcloud_reorg::progress::{format_duration, set_log_only};
use beatcloud_reorg::scoring::{MAX_SCORE, MIN_SCORE};
use beatcloud_reorg::safety::validate_cache_path;
use beatcloud_reorg::spotify::SpotifyClient;
use beatcloud_reorg::store::{contributions, log_contributions, RecordStore};

#[derive(Parser)]
#[command(name = "beatcloud-reorg")]
#[command(about = "Reorganize the local DJ library by contributing user and playlist genre")]
struct Args {
    /// Structure data JSON (playlists, genres, users, bad_files, ignore)
    #[arg(long)]
    structure_data: PathBuf,

    /// Settings JSON (USB_PATH, Spotify credentials, ...)
    #[arg(long)]
    config_path: PathBuf,

    /// Minimum similarity (0-100) to accept a fuzzy match
    #[arg(long, default_value_t = DEFAULT_FUZZ_RATIO)]
    fuzz_ratio: f64,

    /// Actually rename and move files (default is a dry run)
    #[arg(long, alias = "not-test")]
    commit: bool,

    /// Persist new fuzzy matches so later runs reuse them
    #[arg(long)]
    cache_fuzz_results: bool,

    /// Increase diagnostic output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Worker threads (0 = 4x available parallelism, capped at 64)
    #[arg(long, default_value = "0")]
    workers: usize,

    #[arg(long, default_value = RESPONSE_CACHE_FILE)]
    response_cache: PathBuf,

    #[arg(long, default_value = FUZZ_CACHE_FILE)]
    fuzz_cache: PathBuf,

    /// File keys to leave out of fuzzy matching for this run (repeatable)
    #[arg(long)]
    skip: Vec<String>,

    /// Disable progress bars, emit periodic log lines instead
    #[arg(long)]
    log_only: bool,

    /// Write run statistics to a JSON file
    #[arg(long)]
    stats: Option<PathBuf>,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,beatcloud_reorg={}", level)));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    set_log_only(args.log_only);

    if !(MIN_SCORE..=MAX_SCORE).contains(&args.fuzz_ratio) {
        bail!("--fuzz-ratio must be between 0 and 100, got {}", args.fuzz_ratio);
    }

    let start = Instant::now();

    // Pre-flight: nothing below runs if configuration is bad
    let structure = StructureData::load(&args.structure_data).context("Failed to load structure data")?;
    let settings = Settings::load(&args.config_path).context("Failed to load settings")?;
    let inputs = [args.structure_data.as_path(), args.config_path.as_path()];
    validate_cache_path(&args.response_cache, &inputs)?;
    validate_cache_path(&args.fuzz_cache, &inputs)?;

    let options = RunOptions {
        fuzz_ratio: args.fuzz_ratio,
        verbosity: args.verbose,
        commit: args.commit,
        cache_fuzz_results: args.cache_fuzz_results,
    };
    let music_root = settings.music_root();
    let skip: FxHashSet<String> = args.skip.iter().cloned().collect();

    let pool = WorkerPool::new(args.workers).context("Failed to build worker pool")?;
    info!("Using {} workers", pool.workers());

    // Canonical records and remote inventory
    let mut duplicate_track_ids = 0;
    let catalog = match ResponseCache::load(&args.response_cache)? {
        Some(catalog) => catalog,
        None => {
            let (client_id, client_secret) = settings.spotify_credentials()?;
            let spotify = SpotifyClient::new(client_id, client_secret);
            let inventory = S3Inventory::new(&settings.beatcloud_url, settings.aws_profile.as_deref());
            let (catalog, collisions) = fetch_catalog(&spotify, &inventory, &structure)?;
            duplicate_track_ids = collisions.len();
            catalog
                .save(&args.response_cache)
                .context("Failed to write response cache")?;
            catalog
        }
    };
    let ResponseCache { tracks, files } = catalog;
    let store = RecordStore::from_map(tracks);

    log_contributions(&contributions(&store, &structure.users));

    // Local inventory
    let probe = MusicDirProbe::new(&music_root);
    let local = find_local_files(&pool, &probe, &files);
    if options.verbosity > 0 {
        let present: FxHashSet<&str> = local.iter().map(String::as_str).collect();
        let missing: Vec<&String> = files.iter().filter(|f| !present.contains(f.as_str())).collect();
        info!("{} remote files not found locally", missing.len());
        for file in missing {
            info!("\t{}", file);
        }
    }

    let dry_run = DryRun::new();
    let executor: &dyn MoveExecutor = if options.commit { &Commit } else { &dry_run };
    if !options.commit {
        info!("Dry run: no files will be renamed or moved (pass --commit to apply)");
    }

    let ctx = RunContext {
        structure: &structure,
        options: &options,
        music_root: &music_root,
        skip: &skip,
    };
    let mut cache = DecisionCache::load(&args.fuzz_cache)?;
    let mut rec = reconcile(&ctx, store, local, &mut cache, &pool, executor)?;
    rec.stats.inventory_files = files.len();
    rec.stats.duplicate_track_ids = duplicate_track_ids;

    log_fuzzy_matches(&ctx, &rec);
    log_unmatched(&rec);

    let (_plan, report) = place(&ctx, &mut rec, executor);
    if !options.commit {
        info!("Dry run recorded {} filesystem operations", dry_run.operations().len());
    }

    rec.stats.elapsed_seconds = start.elapsed().as_secs_f64();
    rec.stats.log_phase("final");
    if let Some(path) = &args.stats {
        rec.stats
            .write_to_file(path)
            .with_context(|| format!("Failed to write stats to {}", path.display()))?;
    }

    info!(
        "Matched {} of {} files ({:.1}%) in {}",
        rec.stats.total_matches(),
        rec.stats.total_matches() + rec.stats.unmatched,
        rec.stats.match_rate(),
        format_duration(start.elapsed())
    );

    if !report.failures.is_empty() {
        for failure in &report.failures {
            warn!("\t{}: {}", failure.file, failure.error);
        }
        bail!("{} of {} moves failed", report.failures.len(), rec.stats.moves_planned);
    }

    Ok(())
}
