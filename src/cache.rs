use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Memoizes built evaluators by their exact formula text.
///
/// Lookups and inserts are guarded by a mutex, but no lock is held while a
/// missing entry is being built: callers racing on the same key may build
/// redundantly, and all of them converge on whichever instance lands in
/// the map first. Entries are never evicted.
pub struct FormulaCache<T> {
    entries: Mutex<HashMap<String, Arc<T>>>,
}

impl<T> FormulaCache<T> {
    pub fn new() -> FormulaCache<T> {
        FormulaCache {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, text: &str) -> Option<Arc<T>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(text).cloned()
    }

    /// Return the cached value for `text`, building and storing it when
    /// absent. Build failures propagate to the caller and are not cached.
    pub fn get_or_build<E>(
        &self,
        text: &str,
        build: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        if let Some(found) = self.get(text) {
            return Ok(found);
        }

        let built = Arc::new(build()?);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Arc::clone(entries.entry(text.to_string()).or_insert(built)))
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for FormulaCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_by_exact_text() {
        let cache: FormulaCache<i32> = FormulaCache::new();
        let first = cache.get_or_build("2+3", || Ok::<_, ()>(5)).unwrap();
        let second = cache.get_or_build("2+3", || Ok::<_, ()>(99)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // Case matters for the key.
        assert!(cache.get("2+3 ").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache: FormulaCache<i32> = FormulaCache::new();
        assert_eq!(cache.get_or_build("bad", || Err("nope")), Err("nope"));
        assert!(cache.is_empty());
        // A later successful build goes through.
        assert_eq!(*cache.get_or_build("bad", || Ok::<_, &str>(1)).unwrap(), 1);
    }

    #[test]
    fn racing_builders_converge() {
        let cache = Arc::new(FormulaCache::<usize>::new());
        let mut handles = Vec::new();
        for seed in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                cache.get_or_build("key", || Ok::<_, ()>(seed)).unwrap()
            }));
        }
        let results: Vec<Arc<usize>> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();
        for result in &results {
            assert!(Arc::ptr_eq(result, &results[0]));
        }
    }
}
