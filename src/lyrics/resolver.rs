//! Tiered lyric resolution.
//!
//! Strategies run in order and the first one that yields synced lyrics wins:
//!
//! 1. exact lookup with the raw title and artist
//! 2. exact lookup with the normalized title (only when normalization changed it)
//! 3. several free-text searches, candidates ranked by fuzzy similarity
//!
//! Whatever strategy succeeds, the document is cached under the raw identity so
//! the next lookup for the same track is a plain cache hit. When every strategy
//! comes up empty nothing is written and the track stays a miss.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::lrclib::{LrclibRecord, LyricsProvider, SearchCandidate};
use super::normalize::normalize;
use super::{LyricDocument, TrackIdentity};
use crate::storage::CacheStore;

/// Similarity on a 0-100 scale.
pub type Scorer = fn(&str, &str) -> u8;

pub const DEFAULT_CUTOFF: u8 = 50;

/// Case-insensitive normalized Levenshtein similarity, 0-100.
pub fn similarity_score(a: &str, b: &str) -> u8 {
    let similarity = strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase());
    (similarity * 100.0).round().clamp(0.0, 100.0) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Exact,
    Normalized,
    Fuzzy,
}

#[derive(Clone)]
pub struct Resolver {
    provider: Arc<dyn LyricsProvider>,
    cache: CacheStore,
    scorer: Scorer,
    cutoff: u8,
    in_flight: InFlight,
}

impl Resolver {
    pub fn new(provider: Arc<dyn LyricsProvider>, cache: CacheStore) -> Self {
        Self {
            provider,
            cache,
            scorer: similarity_score,
            cutoff: DEFAULT_CUTOFF,
            in_flight: InFlight::default(),
        }
    }

    pub fn with_cutoff(mut self, cutoff: u8) -> Self {
        self.cutoff = cutoff.min(100);
        self
    }

    #[cfg(test)]
    fn with_scorer(mut self, scorer: Scorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Resolve in a background task. Nothing is returned to the caller: the
    /// result shows up in the cache store. Returns `false` if the same track is
    /// already being resolved.
    pub fn spawn(&self, identity: TrackIdentity) -> bool {
        let Some(guard) = self.in_flight.begin(CacheStore::key_for(&identity)) else {
            debug!("already resolving {}", identity.label());
            return false;
        };
        let this = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            this.resolve(&identity).await;
        });
        true
    }

    /// Run every strategy and cache the first hit under the raw identity.
    pub async fn resolve(&self, identity: &TrackIdentity) -> Option<LyricDocument> {
        let Some((record, strategy)) = self.find(identity).await else {
            info!("no synced lyrics for {}", identity.label());
            return None;
        };

        let doc = LyricDocument::from_record(&record);
        info!(
            ?strategy,
            lines = doc.len(),
            "resolved lyrics for {} (lrclib id {})",
            identity.label(),
            record.id
        );

        let cache = self.cache.clone();
        let id = identity.clone();
        let to_store = doc.clone();
        match tokio::task::spawn_blocking(move || cache.write(&id, &to_store)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("failed to cache lyrics for {}: {e:#}", identity.label()),
            Err(e) => warn!("cache write task failed: {e}"),
        }
        Some(doc)
    }

    async fn find(&self, identity: &TrackIdentity) -> Option<(LrclibRecord, Strategy)> {
        let raw_title = identity.title.as_str();
        let artist = identity.artist.as_str();

        if let Some(record) = self.exact(raw_title, artist).await {
            return Some((record, Strategy::Exact));
        }

        let normalized = normalize(raw_title);
        if !normalized.is_empty() && normalized != raw_title {
            if let Some(record) = self.exact(&normalized, artist).await {
                return Some((record, Strategy::Normalized));
            }
        }

        let title = if normalized.is_empty() {
            raw_title.trim()
        } else {
            normalized.as_str()
        };
        self.fuzzy(title, artist, &identity.album)
            .await
            .map(|record| (record, Strategy::Fuzzy))
    }

    async fn exact(&self, title: &str, artist: &str) -> Option<LrclibRecord> {
        match self.provider.get(title, artist).await {
            Ok(Some(record)) if record.has_synced() => Some(record),
            Ok(Some(record)) => {
                if record.instrumental {
                    debug!("exact match is instrumental: {artist} - {title}");
                } else {
                    debug!("exact match without synced lyrics: {artist} - {title}");
                }
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("lyrics lookup failed for {artist} - {title}: {e}");
                None
            }
        }
    }

    async fn fuzzy(&self, title: &str, artist: &str, album: &str) -> Option<LrclibRecord> {
        let mut batches = Vec::new();
        for query in search_queries(title, artist, album) {
            match self.provider.search(&query).await {
                Ok(found) => {
                    debug!("search {query:?}: {} results", found.len());
                    batches.push(found);
                }
                Err(e) => warn!("lyrics search {query:?} failed: {e}"),
            }
        }

        let candidates = dedup_candidates(batches);
        if candidates.is_empty() {
            return None;
        }

        let target = format!("{title} - {artist}");
        let Some((best, score)) = pick_best(&target, &candidates, self.scorer, self.cutoff) else {
            debug!(
                "{} candidates, none above cutoff {} for {target:?}",
                candidates.len(),
                self.cutoff
            );
            return None;
        };
        info!(
            score,
            "fuzzy match {} - {} for {target:?}", best.artist_name, best.track_name
        );

        // Search hits may omit the synced text, so fetch the full record.
        match self.provider.get(&best.track_name, &best.artist_name).await {
            Ok(Some(record)) if record.has_synced() => return Some(record),
            Ok(_) => debug!("refetch of candidate {} had no synced lyrics", best.id),
            Err(e) => warn!("refetch of candidate {} failed: {e}", best.id),
        }
        best.raw.has_synced().then(|| best.raw.clone())
    }
}

/// Free-text queries for the fuzzy tier, without blanks or repeats.
pub fn search_queries(title: &str, artist: &str, album: &str) -> Vec<String> {
    let mut queries = vec![
        format!("{title} {artist}"),
        format!("{artist} {title}"),
        title.to_string(),
    ];
    if !album.trim().is_empty() {
        queries.push(format!("{artist} {album}"));
    }

    let mut seen = HashSet::new();
    queries
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty() && seen.insert(q.clone()))
        .collect()
}

/// Merge search batches, keeping the first occurrence of each provider id.
fn dedup_candidates(batches: Vec<Vec<SearchCandidate>>) -> Vec<SearchCandidate> {
    let mut seen = HashSet::new();
    batches
        .into_iter()
        .flatten()
        .filter(|c| seen.insert(c.id))
        .collect()
}

/// Highest scoring candidate at or above `cutoff`. Ties go to the earlier one.
fn pick_best<'a>(
    target: &str,
    candidates: &'a [SearchCandidate],
    scorer: Scorer,
    cutoff: u8,
) -> Option<(&'a SearchCandidate, u8)> {
    let mut best: Option<(&SearchCandidate, u8)> = None;
    for candidate in candidates {
        let label = format!("{} - {}", candidate.track_name, candidate.artist_name);
        let score = scorer(target, &label);
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }
    best.filter(|(_, score)| *score >= cutoff)
}

/// Cache keys with a resolution currently running.
#[derive(Clone, Default)]
struct InFlight(Arc<Mutex<HashSet<String>>>);

impl InFlight {
    fn begin(&self, key: String) -> Option<InFlightGuard> {
        if self.0.lock().insert(key.clone()) {
            Some(InFlightGuard {
                set: Arc::clone(&self.0),
                key,
            })
        } else {
            None
        }
    }
}

struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}
