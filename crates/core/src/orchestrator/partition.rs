//! Assignment of input ids to workers.

use super::config::PartitionStrategy;

/// Maps record ids onto worker indices.
///
/// The mapping depends only on the id, the strategy, the worker count and the
/// input size, so a restarted worker gets exactly the ids it had before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    strategy: PartitionStrategy,
    workers: usize,
    chunk: u64,
}

impl Partitioner {
    /// `workers` is clamped to at least one.
    pub fn new(strategy: PartitionStrategy, workers: usize, total: u64) -> Self {
        let workers = workers.max(1);
        let chunk = total.div_ceil(workers as u64).max(1);
        Self {
            strategy,
            workers,
            chunk,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Index of the worker that owns `id`.
    pub fn worker_for(&self, id: u64) -> usize {
        match self.strategy {
            PartitionStrategy::Contiguous => ((id / self.chunk) as usize).min(self.workers - 1),
            PartitionStrategy::RoundRobin => (id % self.workers as u64) as usize,
        }
    }

    pub fn contains(&self, worker: usize, id: u64) -> bool {
        self.worker_for(id) == worker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owners(partitioner: &Partitioner, total: u64) -> Vec<usize> {
        (0..total).map(|id| partitioner.worker_for(id)).collect()
    }

    #[test]
    fn test_contiguous_blocks() {
        let p = Partitioner::new(PartitionStrategy::Contiguous, 3, 10);
        assert_eq!(owners(&p, 10), vec![0, 0, 0, 0, 1, 1, 1, 1, 2, 2]);
    }

    #[test]
    fn test_round_robin() {
        let p = Partitioner::new(PartitionStrategy::RoundRobin, 3, 7);
        assert_eq!(owners(&p, 7), vec![0, 1, 2, 0, 1, 2, 0]);
        assert!(p.contains(1, 4));
        assert!(!p.contains(0, 4));
    }

    #[test]
    fn test_more_workers_than_ids() {
        let p = Partitioner::new(PartitionStrategy::Contiguous, 8, 3);
        assert_eq!(owners(&p, 3), vec![0, 1, 2]);
    }

    #[test]
    fn test_ids_past_total_stay_in_range() {
        let p = Partitioner::new(PartitionStrategy::Contiguous, 4, 0);
        assert_eq!(p.worker_for(0), 0);
        assert_eq!(p.worker_for(1_000), 3);

        let p = Partitioner::new(PartitionStrategy::Contiguous, 0, 10);
        assert_eq!(p.workers(), 1);
        assert_eq!(p.worker_for(9), 0);
    }

    #[test]
    fn test_every_id_has_exactly_one_owner() {
        for strategy in [PartitionStrategy::Contiguous, PartitionStrategy::RoundRobin] {
            let p = Partitioner::new(strategy, 4, 101);
            for id in 0..101 {
                let count = (0..4).filter(|&w| p.contains(w, id)).count();
                assert_eq!(count, 1, "id {} under {:?}", id, strategy);
            }
        }
    }
}
