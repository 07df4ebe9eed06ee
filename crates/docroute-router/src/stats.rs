//! Routing counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::node::NodeRole;

/// Snapshot of where operations were sent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoutingStats {
    /// Writes (always on the master)
    pub writes: u64,

    /// Reads served by the master
    pub master_reads: u64,

    /// Reads served by each slave, in pool order
    pub slave_reads: Vec<u64>,
}

impl RoutingStats {
    pub fn total_slave_reads(&self) -> u64 {
        self.slave_reads.iter().sum()
    }

    pub fn total_reads(&self) -> u64 {
        self.master_reads + self.total_slave_reads()
    }

    /// Fraction of reads served by slaves (0.0 - 1.0)
    pub fn slave_ratio(&self) -> f64 {
        let total = self.total_reads();
        if total == 0 {
            0.0
        } else {
            self.total_slave_reads() as f64 / total as f64
        }
    }
}

#[derive(Debug)]
pub(crate) struct StatsRecorder {
    writes: AtomicU64,
    master_reads: AtomicU64,
    slave_reads: Vec<AtomicU64>,
}

impl StatsRecorder {
    pub(crate) fn new(slave_count: usize) -> Self {
        Self {
            writes: AtomicU64::new(0),
            master_reads: AtomicU64::new(0),
            slave_reads: (0..slave_count).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self, target: NodeRole) {
        match target {
            NodeRole::Master => {
                self.master_reads.fetch_add(1, Ordering::Relaxed);
            }
            NodeRole::Slave(index) => {
                if let Some(counter) = self.slave_reads.get(index) {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    pub(crate) fn snapshot(&self) -> RoutingStats {
        RoutingStats {
            writes: self.writes.load(Ordering::Relaxed),
            master_reads: self.master_reads.load(Ordering::Relaxed),
            slave_reads: self
                .slave_reads
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect(),
        }
    }
}
