//! Informational vendor quality telemetry.
//!
//! Scores never change routing; fallback order is the static priority of each
//! [`DataType`]. The ranking is exposed for operators.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::{DataType, UtcDateTime, VendorId};

const LATENCY_WEIGHT: f64 = 0.4;
const COMPLETENESS_WEIGHT: f64 = 0.3;
const RELIABILITY_WEIGHT: f64 = 0.3;

/// Most recent outcome for a (vendor, data type) pair. Lower scores are better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityRecord {
    pub score: f64,
    pub last_latency_ms: u64,
    pub completeness: f64,
    pub reliability: f64,
    pub updated_at: UtcDateTime,
}

/// `0.4*min(latency/1000, 1) + 0.3*(1-completeness) + 0.3*(1-reliability)`.
pub fn quality_score(latency_ms: u64, completeness: f64, reliability: f64) -> f64 {
    let latency = (latency_ms as f64 / 1000.0).min(1.0);
    let completeness = completeness.clamp(0.0, 1.0);
    let reliability = reliability.clamp(0.0, 1.0);

    LATENCY_WEIGHT * latency
        + COMPLETENESS_WEIGHT * (1.0 - completeness)
        + RELIABILITY_WEIGHT * (1.0 - reliability)
}

#[derive(Debug, Default)]
pub struct QualityScorer {
    records: Mutex<HashMap<(VendorId, DataType), QualityRecord>>,
}

impl QualityScorer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(VendorId, DataType), QualityRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrites the record for `(vendor, data_type)`.
    pub fn record_outcome(
        &self,
        vendor: VendorId,
        data_type: DataType,
        latency_ms: u64,
        completeness: f64,
        reliability: f64,
    ) {
        let record = QualityRecord {
            score: quality_score(latency_ms, completeness, reliability),
            last_latency_ms: latency_ms,
            completeness,
            reliability,
            updated_at: UtcDateTime::now(),
        };
        tracing::debug!(%vendor, %data_type, score = record.score, "quality outcome recorded");
        self.lock().insert((vendor, data_type), record);
    }

    pub fn record(&self, vendor: VendorId, data_type: DataType) -> Option<QualityRecord> {
        self.lock().get(&(vendor, data_type)).copied()
    }

    /// Scored vendors ascending by score, then unscored vendors in the static default order.
    pub fn rank(&self, data_type: DataType) -> Vec<VendorId> {
        let records = self.lock();
        let mut scored = data_type
            .priority()
            .iter()
            .enumerate()
            .filter_map(|(position, vendor)| {
                records
                    .get(&(*vendor, data_type))
                    .map(|record| (*vendor, record.score, position))
            })
            .collect::<Vec<_>>();
        scored.sort_by(|left, right| left.1.total_cmp(&right.1).then(left.2.cmp(&right.2)));

        let mut ranked = scored
            .into_iter()
            .map(|(vendor, _, _)| vendor)
            .collect::<Vec<_>>();
        ranked.extend(
            data_type
                .priority()
                .iter()
                .filter(|vendor| !records.contains_key(&(**vendor, data_type))),
        );
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_follows_weighted_formula() {
        assert_eq!(quality_score(0, 1.0, 1.0), 0.0);
        assert!((quality_score(500, 1.0, 0.8) - 0.26).abs() < 1e-9);
        assert!((quality_score(5_000, 0.0, 0.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unscored_vendors_use_default_order() {
        let scorer = QualityScorer::new();
        assert_eq!(
            scorer.rank(DataType::Quote),
            vec![VendorId::Alpaca, VendorId::Polygon, VendorId::Fmp]
        );
    }

    #[test]
    fn failed_vendor_ranks_below_successful_one() {
        let scorer = QualityScorer::new();
        scorer.record_outcome(VendorId::Alpaca, DataType::Bars, 900, 0.0, 0.0);
        scorer.record_outcome(VendorId::Fmp, DataType::Bars, 120, 1.0, 0.8);

        assert_eq!(
            scorer.rank(DataType::Bars),
            vec![VendorId::Fmp, VendorId::Alpaca, VendorId::Polygon]
        );
    }

    #[test]
    fn latest_outcome_overwrites_previous() {
        let scorer = QualityScorer::new();
        scorer.record_outcome(VendorId::Polygon, DataType::News, 100, 1.0, 1.0);
        scorer.record_outcome(VendorId::Polygon, DataType::News, 2_000, 0.0, 0.0);

        let record = scorer.record(VendorId::Polygon, DataType::News).expect("record");
        assert_eq!(record.last_latency_ms, 2_000);
        assert!((record.score - 1.0).abs() < 1e-9);
    }
}
