//! The `probe` and `ls` subcommands.
//!
//! Lookups are synchronous and hold the cache lock, so workers run them on tokio's blocking
//! pool rather than on the async executor threads.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use fscache::{
    CacheError, CacheStats, FsCache, LocalPlatform, LookupFlags, NameForm, ObjectKind, ObjectRef,
};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::app_config::Config;

/// One answered lookup.
pub struct ProbeLine {
    pub path: String,
    pub pass: usize,
    pub outcome: Result<(ObjectKind, Option<u64>), CacheError>,
    pub elapsed: Duration,
}

impl ProbeLine {
    pub fn render(&self) -> String {
        let mut line = format!("[{}] {} ", self.pass, self.path);
        let _ = match &self.outcome {
            Ok((kind, Some(size))) => write!(line, "{kind:?} {size}"),
            Ok((kind, None)) => write!(line, "{kind:?}"),
            Err(e) => write!(line, "error: {e}"),
        };
        let _ = write!(line, " ({:?})", self.elapsed);
        line
    }
}

fn probe_one(
    cache: &FsCache<LocalPlatform>,
    path: &str,
    pass: usize,
    flags: LookupFlags,
) -> ProbeLine {
    let start = Instant::now();
    let outcome = cache.lookup_bytes(path.as_bytes(), flags).map(|obj| {
        let size = obj.attributes().map(|a| a.size);
        (obj.kind(), size)
    });
    ProbeLine {
        path: path.to_owned(),
        pass,
        outcome,
        elapsed: start.elapsed(),
    }
}

async fn probe_all(
    cache: FsCache<LocalPlatform>,
    paths: Vec<String>,
    jobs: usize,
    repeat: usize,
    flags: LookupFlags,
) -> Vec<ProbeLine> {
    let mut lines = Vec::with_capacity(paths.len() * repeat);
    for pass in 1..=repeat {
        let mut workers = JoinSet::new();
        let chunk = paths.len().div_ceil(jobs.max(1)).max(1);
        for slice in paths.chunks(chunk) {
            let cache = cache.clone();
            let slice = slice.to_vec();
            workers.spawn_blocking(move || {
                slice
                    .iter()
                    .map(|path| probe_one(&cache, path, pass, flags))
                    .collect::<Vec<_>>()
            });
        }
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(batch) => lines.extend(batch),
                Err(e) => warn!(error = %e, "probe worker failed"),
            }
        }
        debug!(pass, stats = ?cache.stats(), "probe pass finished");
    }
    lines
}

/// Look up every path `repeat` times from `jobs` workers and return the rendered results.
pub fn run_probe(
    config: &Config,
    paths: Vec<String>,
    no_missing: bool,
) -> Result<(Vec<ProbeLine>, CacheStats), CacheError> {
    let cache = FsCache::new(LocalPlatform::new(), config.cache.clone())?;
    let flags = if no_missing {
        LookupFlags::NO_MISSING
    } else {
        LookupFlags::empty()
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .max_blocking_threads(config.probe.jobs.max(1))
        .enable_all()
        .build()?;
    let lines = runtime.block_on(probe_all(
        cache.clone(),
        paths,
        config.probe.jobs,
        config.probe.repeat,
        flags,
    ));
    let stats = cache.stats();
    info!(
        lookups = stats.lookups,
        hits = stats.path_hits,
        populations = stats.populations,
        "probe finished"
    );
    Ok((lines, stats))
}

fn describe(cache: &FsCache<LocalPlatform>, obj: &ObjectRef<LocalPlatform>) -> String {
    let info = obj.info();
    let size = info.attributes.map_or(0, |a| a.size);
    let marker = match info.kind {
        ObjectKind::Directory => "d",
        ObjectKind::File => "-",
        ObjectKind::Other => "o",
        ObjectKind::Missing => "?",
    };
    format!(
        "{marker} {size:>12} {}",
        cache.full_path_string(obj, NameForm::Long)
    )
}

/// List the directory at `path` through the cache.
pub fn run_ls(config: &Config, path: &str) -> Result<Vec<String>, CacheError> {
    let cache = FsCache::new(LocalPlatform::new(), config.cache.clone())?;
    let dir = cache.lookup_no_missing(path)?;
    let mut children = cache.read_dir(&dir)?;
    children.sort_by_key(|c| c.name().to_string_lossy().into_owned());
    Ok(children.iter().map(|c| describe(&cache, c)).collect())
}
