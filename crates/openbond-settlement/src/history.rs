//! Bounded settlement-report history.
//!
//! Each `(bond, batch sequence)` settles at most once; recording the same
//! key twice is an error. The history keeps the most recent
//! `max_size` reports and evicts the oldest so memory stays predictable in
//! long-running nodes.

use std::collections::{BTreeMap, VecDeque};

use openbond_types::{BatchSeq, BondDid, BondsError, Result, SettlementReport};

/// Settled reports by `(bond, batch sequence)`, with FIFO eviction.
#[derive(Debug, Clone)]
pub struct ReportHistory {
    reports: BTreeMap<(BondDid, BatchSeq), SettlementReport>,
    /// Insertion order (front = oldest).
    order: VecDeque<(BondDid, BatchSeq)>,
    max_size: usize,
}

impl ReportHistory {
    /// History holding at most `max_size` reports (at least one).
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            reports: BTreeMap::new(),
            order: VecDeque::new(),
            max_size: max_size.max(1),
        }
    }

    /// Record a settled report.
    ///
    /// # Errors
    /// Returns [`BondsError::Internal`] if a report for the same bond and
    /// batch sequence is already held.
    pub fn record(&mut self, report: SettlementReport) -> Result<()> {
        let key = (report.bond_did.clone(), report.seq);
        if self.reports.contains_key(&key) {
            return Err(BondsError::Internal(format!(
                "batch {} of {} settled twice",
                key.1, key.0
            )));
        }

        if self.reports.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.reports.remove(&oldest);
            }
        }

        self.order.push_back(key.clone());
        self.reports.insert(key, report);
        Ok(())
    }

    /// The report of batch `seq` of `bond_did`.
    pub fn get(&self, bond_did: &BondDid, seq: BatchSeq) -> Result<&SettlementReport> {
        self.reports
            .get(&(bond_did.clone(), seq))
            .ok_or_else(|| BondsError::ReportNotFound {
                bond_did: bond_did.clone(),
                seq,
            })
    }

    /// The most recent report held for `bond_did`.
    #[must_use]
    pub fn latest(&self, bond_did: &BondDid) -> Option<&SettlementReport> {
        self.reports
            .range((bond_did.clone(), BatchSeq(0))..=(bond_did.clone(), BatchSeq(u64::MAX)))
            .next_back()
            .map(|(_, report)| report)
    }

    #[must_use]
    pub fn contains(&self, bond_did: &BondDid, seq: BatchSeq) -> bool {
        self.reports.contains_key(&(bond_did.clone(), seq))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}
