//! Memoized folding of many parts into one mesh.
//!
//! Each intermediate result is stored under a key spelling out the fold that
//! produced it, e.g. `"body+arm!-hole!"`, so a regeneration that changes a
//! single part recomputes only the steps after it.

use crate::errors::CombineError;
use crate::mesh::combiner::Method;
use crate::mesh::state::MeshState;
use hashbrown::HashMap;
use log::{debug, trace};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// How a part joins the parts before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CombineMode {
    #[default]
    Normal,
    /// Subtracted from the accumulated mesh
    Inversion,
    /// Not combined at all
    Uncombined,
}

impl CombineMode {
    pub const fn method(self) -> Method {
        match self {
            CombineMode::Inversion => Method::Difference,
            CombineMode::Normal | CombineMode::Uncombined => Method::Union,
        }
    }
}

type Cell = Arc<OnceLock<Option<Arc<MeshState>>>>;

/// Combination results by fold key. `None` records a combination that failed,
/// so it is not retried.
#[derive(Debug, Default)]
pub struct CombinationCache {
    cells: Mutex<HashMap<String, Cell>>,
}

impl CombinationCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, key: &str) -> Cell {
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cells.entry(key.to_string()).or_default())
    }

    /// Cached result for `key`, running `combine` only if no other caller has
    /// produced it. Callers racing on one key wait for the first.
    pub fn get_or_combine<F>(&self, key: &str, combine: F) -> Option<Arc<MeshState>>
    where
        F: FnOnce() -> Option<Arc<MeshState>>,
    {
        let cell = self.cell(key);
        cell.get_or_init(combine).clone()
    }

    /// `Some` once `key` has been computed, holding the stored outcome.
    pub fn get(&self, key: &str) -> Option<Option<Arc<MeshState>>> {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    pub fn len(&self) -> usize {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Result of folding parts together
#[derive(Debug, Clone)]
pub struct Assembly {
    pub state: Option<Arc<MeshState>>,
    /// `false` if any combination step failed and was skipped
    pub successful: bool,
}

/// Fold `parts` left to right into one state.
///
/// Null and [`CombineMode::Uncombined`] parts are skipped and the first
/// remaining part seeds the fold. A failing step keeps the accumulated state
/// as it was and marks the assembly unsuccessful.
pub fn combine_multiple<I>(parts: I, recombine: bool, cache: &CombinationCache) -> Assembly
where
    I: IntoIterator<Item = (Option<MeshState>, CombineMode, String)>,
{
    let mut accumulated: Option<Arc<MeshState>> = None;
    let mut key = String::new();
    let mut successful = true;

    for (state, mode, id) in parts {
        let Some(state) = state.filter(|state| !state.is_null()) else {
            continue;
        };
        if mode == CombineMode::Uncombined {
            continue;
        }
        let Some(current) = accumulated.clone() else {
            accumulated = Some(Arc::new(state));
            key = id;
            continue;
        };

        let method = mode.method();
        key.push_str(if method == Method::Union { "+" } else { "-" });
        key.push_str(&id);
        if recombine {
            key.push('!');
        }

        let combined = cache.get_or_combine(&key, || {
            trace!("Combining {}", key);
            match MeshState::combine_with(&current, &state, method, recombine) {
                Ok(combined) => Some(Arc::new(combined)),
                Err(error) => {
                    debug!("Combination {} failed: {}", key, error);
                    None
                },
            }
        });
        match combined {
            Some(combined) if !combined.is_null() => accumulated = Some(combined),
            _ => successful = false,
        }
    }

    Assembly {
        state: accumulated.filter(|state| !state.is_null()),
        successful,
    }
}

/// Combine exactly two states through the cache under an explicit key.
pub fn combine_cached(
    cache: &CombinationCache,
    key: &str,
    first: &MeshState,
    second: &MeshState,
    method: Method,
    recombine: bool,
) -> Result<Arc<MeshState>, CombineError> {
    let mut failure = None;
    let combined = cache.get_or_combine(key, || match MeshState::combine_with(first, second, method, recombine) {
        Ok(state) => Some(Arc::new(state)),
        Err(error) => {
            failure = Some(error);
            None
        },
    });
    combined.ok_or_else(|| {
        failure.unwrap_or_else(|| CombineError::Geometric(format!("Combination {} failed before", key)))
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::shapes;

    #[test]
    fn cache_runs_each_key_once() {
        let cache = CombinationCache::new();
        let mut runs = 0;
        for _ in 0..3 {
            let result = cache.get_or_combine("a+b", || {
                runs += 1;
                None
            });
            assert!(result.is_none());
        }
        assert_eq!(runs, 1);
        assert!(matches!(cache.get("a+b"), Some(None)));
        assert!(cache.get("a-b").is_none());
    }

    #[test]
    fn skipped_parts_do_not_touch_the_key() {
        let cache = CombinationCache::new();
        let (vertices, faces) = shapes::cube(1.0);
        let cube = MeshState::new(vertices, &faces).unwrap();
        let parts = vec![
            (None, CombineMode::Normal, "missing".to_string()),
            (Some(MeshState::default()), CombineMode::Normal, "null".to_string()),
            (Some(cube), CombineMode::Normal, "cube".to_string()),
            (Some(MeshState::default()), CombineMode::Uncombined, "loose".to_string()),
        ];
        let assembly = combine_multiple(parts, true, &cache);
        assert!(assembly.successful);
        assert!(assembly.state.is_some());
        assert!(cache.is_empty());
    }

    #[test]
    fn inversion_maps_to_difference() {
        assert_eq!(CombineMode::Inversion.method(), Method::Difference);
        assert_eq!(CombineMode::Normal.method(), Method::Union);
    }
}
