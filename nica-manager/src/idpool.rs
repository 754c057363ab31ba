//! Reusable dense-integer ID allocator (spec §3, §8).
//!
//! Ported from `original_source/manager/idpool.py`: `get_id` prefers reuse
//! from the free set, otherwise advances `last_id` through the successor
//! function until a value passes the caller's predicate (values skipped
//! along the way are parked in `free` for later reuse, not discarded).

use std::collections::HashSet;

use crate::error::{NicaError, Result};

/// A pool of `u32` ids with reuse. Mirrors `IDPool` in the original Python
/// source: `in_use` and `free` partition every id ever handed out, and the
/// successor function defaults to `+1`.
pub struct IdPool {
    last_id: i64,
    max_id: Option<u32>,
    in_use: HashSet<u32>,
    free: HashSet<u32>,
}

impl IdPool {
    /// `min_id` is the id immediately preceding the first one that will be
    /// allocated (the Python default is `-1`, yielding a first id of `0`).
    pub fn new(min_id: i64, max_id: Option<u32>) -> Self {
        Self {
            last_id: min_id,
            max_id,
            in_use: HashSet::new(),
            free: HashSet::new(),
        }
    }

    pub fn with_max(max_id: u32) -> Self {
        Self::new(-1, Some(max_id))
    }

    /// Allocate the next id satisfying `condition`, reusing a freed id
    /// first. Fails with [`NicaError::NoSpace`] once `max_id` is reached.
    pub fn get_id_matching(&mut self, condition: impl Fn(u32) -> bool) -> Result<u32> {
        if let Some(&id) = self.free.iter().find(|&&id| condition(id)) {
            self.free.remove(&id);
            self.in_use.insert(id);
            return Ok(id);
        }

        loop {
            let next = self.last_id + 1;
            self.last_id = next;
            let id = u32::try_from(next).map_err(|_| NicaError::NoSpace)?;
            if let Some(max_id) = self.max_id {
                if id >= max_id {
                    return Err(NicaError::NoSpace);
                }
            }
            if condition(id) {
                self.in_use.insert(id);
                return Ok(id);
            }
            self.free.insert(id);
        }
    }

    pub fn get_id(&mut self) -> Result<u32> {
        self.get_id_matching(|_| true)
    }

    /// Return `id` to the free set. No-op if `id` was not in use (mirrors
    /// the Python source, which silently ignores double-release).
    pub fn release_id(&mut self, id: u32) {
        if self.in_use.remove(&id) {
            self.free.insert(id);
        }
    }

    #[cfg(test)]
    pub fn in_use_count(&self) -> usize {
        self.in_use.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_released_ids_before_advancing() {
        let mut pool = IdPool::new(-1, None);
        let ids: Vec<u32> = (0..5).map(|_| pool.get_id().unwrap()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        pool.release_id(3);
        assert_eq!(pool.get_id().unwrap(), 3);
        assert_eq!(pool.get_id().unwrap(), 5);
    }

    #[test]
    fn exhaustion_reports_enospc() {
        let mut pool = IdPool::with_max(3);
        assert_eq!(pool.get_id().unwrap(), 0);
        assert_eq!(pool.get_id().unwrap(), 1);
        assert_eq!(pool.get_id().unwrap(), 2);
        assert!(matches!(pool.get_id(), Err(NicaError::NoSpace)));
    }

    #[test]
    fn exhaustion_then_release_allows_reuse() {
        let mut pool = IdPool::with_max(3);
        pool.get_id().unwrap();
        let one = pool.get_id().unwrap();
        pool.get_id().unwrap();
        assert!(pool.get_id().is_err());
        pool.release_id(one);
        assert_eq!(pool.get_id().unwrap(), one);
    }

    #[test]
    fn in_use_and_free_are_disjoint() {
        let mut pool = IdPool::new(-1, None);
        for _ in 0..10 {
            pool.get_id().unwrap();
        }
        for id in [1, 3, 5, 7] {
            pool.release_id(id);
        }
        let mut seen = HashSet::new();
        for _ in 0..4 {
            let id = pool.get_id().unwrap();
            assert!(seen.insert(id), "id {id} allocated twice");
        }
        assert_eq!(pool.in_use_count(), 10);
    }

    #[test]
    fn predicate_parks_skipped_successors_in_free() {
        let mut pool = IdPool::new(-1, None);
        // Only even ids are acceptable; odd ones should land in `free`.
        let id = pool.get_id_matching(|id| id % 2 == 0).unwrap();
        assert_eq!(id, 0);
        let id = pool.get_id_matching(|id| id % 2 == 0).unwrap();
        assert_eq!(id, 2);
        // The skipped odd id (1) is now available to a predicate that wants it.
        let odd = pool.get_id_matching(|id| id % 2 == 1).unwrap();
        assert_eq!(odd, 1);
    }
}
