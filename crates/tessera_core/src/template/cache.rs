//! Size-bounded template cache with batched LRU eviction.
//!
//! # Invariants
//! - The cache never holds more than `max_size` entries after an insert.
//! - When an insert finds the cache at capacity, the oldest-accessed 20%
//!   (at least one entry) is evicted first, then the new entry is stored.
//!   After a shrink, enough extra entries go to get back under the bound.
//! - Every hit refreshes the entry's access stamp.
//! - Access stamps come from a logical clock, so ordering is total.

use super::{RenderFn, TemplateCompiler, TemplateError};
use crate::assets::AssetFetcher;
use crate::config::DEFAULT_TEMPLATE_CACHE_SIZE;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

const EVICTION_PERCENT: usize = 20;

struct CachedTemplate {
    render: RenderFn,
    last_access: u64,
}

struct CacheState {
    entries: HashMap<String, CachedTemplate>,
    max_size: usize,
    clock: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

pub struct TemplateCache {
    state: Mutex<CacheState>,
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE_CACHE_SIZE)
    }
}

impl TemplateCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                max_size: max_size.max(1),
                clock: 0,
            }),
        }
    }

    /// Number of entries evicted when an insert finds `len` entries at capacity.
    pub fn eviction_batch(len: usize) -> usize {
        (len * EVICTION_PERCENT).div_ceil(100).max(1)
    }

    /// Returns the compiled render function for `path`, fetching and
    /// compiling it on a miss. With `use_cache` off the cache is neither
    /// read nor written.
    pub async fn load_template(
        &self,
        path: &str,
        use_cache: bool,
        fetcher: &dyn AssetFetcher,
        compiler: &dyn TemplateCompiler,
    ) -> Result<RenderFn, TemplateError> {
        if use_cache {
            if let Some(render) = self.get(path) {
                debug!("event=template_load module=template status=ok cache=hit path={path}");
                return Ok(render);
            }
        }

        let source = match fetcher.fetch_text(path).await {
            Ok(Some(source)) => source,
            Ok(None) => {
                warn!("event=template_load module=template status=error error_code=template_not_found path={path}");
                return Err(TemplateError::NotFound {
                    path: path.to_string(),
                    cause: None,
                });
            }
            Err(err) => {
                warn!("event=template_load module=template status=error error_code=template_not_found path={path} error={err}");
                return Err(TemplateError::NotFound {
                    path: path.to_string(),
                    cause: Some(err),
                });
            }
        };

        let render = compiler.compile(&source).map_err(|err| match err {
            TemplateError::Compile { message, .. } => TemplateError::Compile {
                path: path.to_string(),
                message,
            },
            other => other,
        })?;

        if use_cache {
            self.insert(path, render.clone());
        }
        debug!("event=template_load module=template status=ok cache=miss path={path}");
        Ok(render)
    }

    /// Cache lookup; a hit refreshes the access stamp.
    pub fn get(&self, path: &str) -> Option<RenderFn> {
        let mut state = self.lock();
        let stamp = state.tick();
        let entry = state.entries.get_mut(path)?;
        entry.last_access = stamp;
        Some(entry.render.clone())
    }

    /// Stores `render` under `path`, evicting a batch first when full.
    pub fn insert(&self, path: &str, render: RenderFn) {
        let mut state = self.lock();
        if !state.entries.contains_key(path) && state.entries.len() >= state.max_size {
            evict_oldest(&mut state);
        }
        let last_access = state.tick();
        state.entries.insert(
            path.to_string(),
            CachedTemplate {
                render,
                last_access,
            },
        );
    }

    /// Changes the bound; a shrink is enforced on the next insert.
    pub fn configure_caching(&self, max_size: usize) {
        if max_size == 0 {
            warn!("event=template_cache_config module=template status=warn reason=zero_max_size applied=1");
        }
        self.lock().max_size = max_size.max(1);
    }

    pub fn clear_caches(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.clock = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.lock().max_size
    }

    /// Whether `path` is cached; does not count as an access.
    pub fn contains(&self, path: &str) -> bool {
        self.lock().entries.contains_key(path)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn evict_oldest(state: &mut CacheState) {
    let len = state.entries.len();
    let overflow = (len + 1).saturating_sub(state.max_size);
    let batch = TemplateCache::eviction_batch(len).max(overflow);
    let mut by_age: Vec<(u64, String)> = state
        .entries
        .iter()
        .map(|(path, entry)| (entry.last_access, path.clone()))
        .collect();
    by_age.sort_unstable();

    for (_, path) in by_age.into_iter().take(batch) {
        state.entries.remove(&path);
    }
    info!(
        "event=template_evict module=template status=ok evicted={batch} remaining={}",
        state.entries.len()
    );
}
