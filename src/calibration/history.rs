//! Rolling pressure history for the live calibration graph.

use std::collections::VecDeque;

/// Bounded history of the most recent calibration samples, oldest evicted.
///
/// The capacity tracks the width of the graph drawing it, so it can change at
/// runtime; shrinking drops the oldest points.
#[derive(Debug, Clone)]
pub struct PressureHistory {
    samples: VecDeque<u16>,
    capacity: usize,
}

impl PressureHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: u16) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<u16> {
        self.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Oldest first.
    pub fn to_vec(&self) -> Vec<u16> {
        self.samples.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest() {
        let mut history = PressureHistory::new(3);
        for value in [1, 2, 3, 4] {
            history.push(value);
        }
        assert_eq!(history.to_vec(), vec![2, 3, 4]);
        assert_eq!(history.latest(), Some(4));
    }

    #[test]
    fn test_shrink_keeps_newest() {
        let mut history = PressureHistory::new(5);
        for value in 0..5 {
            history.push(value);
        }
        history.set_capacity(2);
        assert_eq!(history.to_vec(), vec![3, 4]);
    }

    #[test]
    fn test_zero_capacity_clamps_to_one() {
        let mut history = PressureHistory::new(0);
        history.push(7);
        history.push(8);
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.to_vec(), vec![8]);
    }
}
