//! Incremental aggregation run.
//!
//! A run loads the cache, discovers session files for every provider in
//! parallel, evicts vanished sessions, reparses new or modified files one
//! at a time, persists the cache and returns the final aggregate. Progress
//! snapshots go to every subscriber along the way:
//!
//! 1. one snapshot of the reusable cache before any reparse (complete when
//!    nothing needs reparsing, in which case it is also the last one);
//! 2. an interim snapshot every `PROGRESS_BATCH` files and at the end of
//!    the reparse list;
//! 3. a final complete snapshot built from the fully updated cache.

use log::{debug, info, warn};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, Sender},
    time::Instant,
};

use crate::config::Config;
use crate::cost::{ModelPricing, PricingTable};
use crate::discovery::{discover, SessionFileRef};
use crate::error::{Error, Result};
use crate::parser::parse_session;
use crate::provider::ProviderSource;
use crate::reconcile::{apply_evictions, reconcile};
use crate::stats::{aggregate_global, aggregate_provider, GlobalAggregate};
use crate::stats_cache::{GlobalStatsCache, ProviderCache, StatsCacheStore};

pub const PROGRESS_BATCH: usize = 10;

/// Cache paths with a run in flight, shared by every engine in the process.
static ACTIVE_RUNS: Mutex<Vec<PathBuf>> = parking_lot::const_mutex(Vec::new());

/// Claims a cache path for one run; released on drop.
struct RunGuard {
    cache_path: PathBuf,
}

impl RunGuard {
    fn acquire(cache_path: &Path) -> Option<Self> {
        let mut active = ACTIVE_RUNS.lock();
        if active.iter().any(|p| p == cache_path) {
            return None;
        }
        active.push(cache_path.to_path_buf());
        Some(Self {
            cache_path: cache_path.to_path_buf(),
        })
    }

    fn is_held(cache_path: &Path) -> bool {
        ACTIVE_RUNS.lock().iter().any(|p| p == cache_path)
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        ACTIVE_RUNS.lock().retain(|p| p != &self.cache_path);
    }
}

/// One progress emission. `processed` never decreases within a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsProgress {
    pub processed: usize,
    pub total: usize,
    pub snapshot: GlobalAggregate,
}

pub struct StatsEngine {
    providers: Vec<ProviderSource>,
    store: StatsCacheStore,
    pricing: ModelPricing,
    subscribers: Mutex<Vec<Sender<StatsProgress>>>,
}

impl StatsEngine {
    pub fn new(config: Config) -> Self {
        let table = if config.refresh_pricing {
            PricingTable::with_remote_refresh(&config.pricing_cache_path)
        } else {
            PricingTable::builtin()
        };
        let pricing = table.resolve(&config.pricing_model);
        debug!("Pricing costed providers as {}", config.pricing_model);

        Self {
            providers: config.providers,
            store: StatsCacheStore::new(config.cache_path),
            pricing,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &StatsCacheStore {
        &self.store
    }

    /// Receive every snapshot emitted by later runs. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> Receiver<StatsProgress> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// True while any engine in this process is running against the same
    /// cache file.
    pub fn is_running(&self) -> bool {
        RunGuard::is_held(self.store.path())
    }

    /// Run one aggregation and return the final, complete snapshot. Only one
    /// run per cache file may be active in the process; a second caller is
    /// rejected.
    pub fn compute_global_stats(&self) -> Result<GlobalAggregate> {
        let Some(_guard) = RunGuard::acquire(self.store.path()) else {
            return Err(Error::RunInProgress);
        };
        let started = Instant::now();

        let mut cache = self.store.load();
        cache
            .providers
            .retain(|id, _| self.providers.iter().any(|p| p.id() == id));

        debug!("Scanning {} providers", self.providers.len());
        let discovered: Vec<(&ProviderSource, Vec<SessionFileRef>)> = self
            .providers
            .par_iter()
            .map(|source| (source, discover(source)))
            .collect();
        let discovered_count: usize = discovered.iter().map(|(_, files)| files.len()).sum();

        let mut pending: Vec<(&ProviderSource, SessionFileRef)> = Vec::new();
        let mut evicted = 0;
        for (source, files) in discovered {
            let provider_cache = cache.provider_mut(source.id());
            let plan = reconcile(&files, provider_cache);
            evicted += apply_evictions(provider_cache, &plan.to_evict);
            debug!(
                "{}: {} reusable, {} to reparse, {} evicted",
                source.id(),
                plan.reusable,
                plan.to_reparse.len(),
                plan.to_evict.len()
            );
            pending.extend(plan.to_reparse.into_iter().map(|file| (source, file)));
        }

        let total = pending.len();
        if total == 0 {
            self.store.save_or_log(&mut cache);
            let snapshot = self.snapshot(&cache, true);
            self.emit(0, 0, &snapshot);
            info!(
                "Stats up to date: {} sessions, {} evicted in {:?}",
                discovered_count,
                evicted,
                started.elapsed()
            );
            return Ok(snapshot);
        }

        self.emit(0, total, &self.snapshot(&cache, false));

        for (processed, (source, file)) in pending.into_iter().enumerate() {
            let sessions = &mut cache.provider_mut(source.id()).sessions;
            match read_session(&file.path) {
                Ok(content) => {
                    let mut stats =
                        parse_session(source.spec.format, &content.text, content.size_bytes);
                    stats.file_mtime_millis = file.mtime_millis;
                    sessions.insert(file.session_key, stats);
                }
                Err(e) => {
                    if e.kind() == ErrorKind::NotFound {
                        debug!("{} vanished before it could be read", file.path.display());
                    } else {
                        warn!("Failed to read {}: {}", file.path.display(), e);
                    }
                    // Left out so the next run retries it
                    sessions.remove(&file.session_key);
                }
            }

            let done = processed + 1;
            if done % PROGRESS_BATCH == 0 || done == total {
                self.emit(done, total, &self.snapshot(&cache, false));
            }
        }

        self.store.save_or_log(&mut cache);
        let snapshot = self.snapshot(&cache, true);
        self.emit(total, total, &snapshot);
        info!(
            "Stats refreshed: {} sessions, {} reparsed, {} evicted in {:?}",
            discovered_count,
            total,
            evicted,
            started.elapsed()
        );
        Ok(snapshot)
    }

    fn snapshot(&self, cache: &GlobalStatsCache, is_complete: bool) -> GlobalAggregate {
        let empty = ProviderCache::default();
        let aggregates = self.providers.iter().map(|source| {
            let provider_cache = cache.provider(source.id()).unwrap_or(&empty);
            (
                source.id(),
                aggregate_provider(provider_cache, source.spec.has_cost_data, &self.pricing),
            )
        });
        aggregate_global(aggregates, is_complete)
    }

    /// Fire-and-forget: closed receivers are dropped, never waited on.
    fn emit(&self, processed: usize, total: usize, snapshot: &GlobalAggregate) {
        let progress = StatsProgress {
            processed,
            total,
            snapshot: snapshot.clone(),
        };
        self.subscribers
            .lock()
            .retain(|tx| tx.send(progress.clone()).is_ok());
    }
}

struct SessionContent {
    text: String,
    size_bytes: u64,
}

fn read_session(path: &Path) -> std::io::Result<SessionContent> {
    let bytes = fs::read(path)?;
    let size_bytes = bytes.len() as u64;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };
    Ok(SessionContent { text, size_bytes })
}
