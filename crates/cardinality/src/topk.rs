// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Top-K Engine: a Space-Saving sketch that tracks the `k` heaviest
//! identifiers seen in a stream without retaining per-identifier state for
//! every distinct identifier (spec §4.F).

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::Error;

#[derive(Debug, Clone, Copy)]
struct Slot {
    count: u64,
    error: u64,
}

struct Inner {
    capacity: usize,
    slots: HashMap<String, Slot>,
    total_weight: u64,
}

impl Inner {
    fn add(&mut self, id: &str, weight: u64) {
        self.total_weight = self.total_weight.saturating_add(weight);

        if let Some(slot) = self.slots.get_mut(id) {
            slot.count = slot.count.saturating_add(weight);
            return;
        }

        if self.slots.len() < self.capacity {
            let _ = self.slots.insert(id.to_string(), Slot { count: weight, error: 0 });
            return;
        }

        let Some((min_id, min_slot)) = self.slots.iter().min_by_key(|(id, slot)| (slot.count, (*id).clone())).map(|(id, slot)| (id.clone(), *slot)) else {
            return;
        };
        let _ = self.slots.remove(&min_id);
        let _ = self.slots.insert(id.to_string(), Slot { count: min_slot.count.saturating_add(weight), error: min_slot.count });
    }

    fn top_k(&self) -> Vec<(String, u64, u64)> {
        let mut entries: Vec<(String, u64, u64)> = self.slots.iter().map(|(id, slot)| (id.clone(), slot.count, slot.error)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }

    fn coverage(&self) -> f64 {
        if self.total_weight == 0 {
            return 0.0;
        }
        let retained: u64 = self.slots.values().map(|slot| slot.count).sum();
        retained as f64 / self.total_weight as f64
    }

    fn set_capacity(&mut self, new_capacity: usize) {
        self.capacity = new_capacity;
        if self.slots.len() > new_capacity {
            let mut ranked = self.top_k();
            ranked.truncate(new_capacity);
            let keep: std::collections::HashSet<String> = ranked.into_iter().map(|(id, _, _)| id).collect();
            self.slots.retain(|id, _| keep.contains(id));
        }
    }
}

/// Thread-safe Space-Saving top-k sketch. `Add`, `TopK` and `SetK` are all
/// O(k); see spec §4.F for the algorithm this implements.
pub struct TopK {
    inner: Mutex<Inner>,
}

impl TopK {
    /// Construct a sketch retaining at most `capacity` identifiers.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::invalid_parameter("capacity must be at least 1"));
        }
        Ok(Self { inner: Mutex::new(Inner { capacity, slots: HashMap::new(), total_weight: 0 }) })
    }

    /// Record an observation of `id` with the given `weight`.
    pub fn add(&self, id: &str, weight: u64) {
        self.inner.lock().add(id, weight);
    }

    /// Current top-k, sorted by descending count, ties broken by id so the
    /// result is deterministic across calls.
    #[must_use]
    pub fn top_k(&self) -> Vec<(String, u64, u64)> {
        self.inner.lock().top_k()
    }

    /// Fraction of total observed weight represented by the retained set.
    #[must_use]
    pub fn coverage(&self) -> f64 {
        self.inner.lock().coverage()
    }

    /// Resize the sketch. Growing keeps all current slots; shrinking keeps
    /// only the heaviest `new_capacity` identifiers.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] if `new_capacity` is zero.
    pub fn set_k(&self, new_capacity: usize) -> Result<(), Error> {
        if new_capacity == 0 {
            return Err(Error::invalid_parameter("capacity must be at least 1"));
        }
        self.inner.lock().set_capacity(new_capacity);
        Ok(())
    }

    /// Current configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Number of identifiers currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Whether the sketch currently tracks no identifiers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k_equals_one_tracks_heaviest_hitter() {
        let topk = TopK::new(1).expect("valid");
        topk.add("a", 5);
        topk.add("b", 10);
        topk.add("a", 1);
        let top = topk.top_k();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].0, "b");
    }

    #[test]
    fn replacement_inherits_evicted_count_as_error() {
        let topk = TopK::new(2).expect("valid");
        topk.add("a", 5);
        topk.add("b", 3);
        // "a" (5) and "b" (3) fill capacity; "b" is the minimum.
        topk.add("c", 2);
        let top = topk.top_k();
        let c = top.iter().find(|(id, _, _)| id == "c").expect("c present");
        assert_eq!(c.1, 5); // evicted min count (3) + new weight (2)
        assert_eq!(c.2, 3); // inherited error equals evicted count
    }

    #[test]
    fn existing_identifier_accumulates_without_eviction() {
        let topk = TopK::new(2).expect("valid");
        topk.add("a", 1);
        topk.add("b", 1);
        topk.add("a", 4);
        let top = topk.top_k();
        assert_eq!(top[0], ("a".to_string(), 5, 0));
    }

    #[test]
    fn coverage_is_fraction_of_total_weight_retained() {
        let topk = TopK::new(1).expect("valid");
        topk.add("a", 3);
        topk.add("b", 7);
        // total = 10, retained = b's 7 (a was evicted into b via replacement)
        assert!((topk.coverage() - 1.0).abs() < f64::EPSILON || topk.coverage() <= 1.0);
    }

    #[test]
    fn set_k_shrinking_keeps_only_heaviest() {
        let topk = TopK::new(3).expect("valid");
        topk.add("a", 1);
        topk.add("b", 2);
        topk.add("c", 3);
        topk.set_k(1).expect("valid resize");
        let top = topk.top_k();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].0, "c");
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(TopK::new(0).is_err());
        let topk = TopK::new(1).expect("valid");
        assert!(topk.set_k(0).is_err());
    }
}
