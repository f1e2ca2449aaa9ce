//! Prometheus counters for the proof API

use prometheus_client::metrics::{counter::Counter, family::Family};
use prometheus_client::registry::Registry;

type Labels = Vec<(String, String)>;

/// Record kind label: `invoice` for document proofs, `file` for vault files
fn kind(kind: &str) -> Labels {
    vec![("kind".to_string(), kind.to_string())]
}

#[derive(Clone, Default)]
pub struct ProofMetrics {
    upserts: Family<Labels, Counter>,
    deletions: Family<Labels, Counter>,
    cleanup_removed: Family<Labels, Counter>,
    verify_checks: Counter,
    verify_verified: Counter,
}

impl ProofMetrics {
    pub fn new(registry: &mut Registry) -> Self {
        let metrics = Self::default();

        registry.register(
            "zkb_proof_upserts",
            "Proof records created or replaced",
            metrics.upserts.clone(),
        );
        registry.register(
            "zkb_proof_deletions",
            "Proof records removed by explicit delete",
            metrics.deletions.clone(),
        );
        registry.register(
            "zkb_proof_cleanup_removed",
            "Proof records removed by orphan cleanup",
            metrics.cleanup_removed.clone(),
        );
        registry.register(
            "zkb_proof_verify_checks",
            "Checks received by batch verification",
            metrics.verify_checks.clone(),
        );
        registry.register(
            "zkb_proof_verify_verified",
            "Checks that matched the stored digest",
            metrics.verify_verified.clone(),
        );

        metrics
    }

    pub fn upsert(&self, record_kind: &str) {
        self.upserts.get_or_create(&kind(record_kind)).inc();
    }

    pub fn deleted(&self, record_kind: &str) {
        self.deletions.get_or_create(&kind(record_kind)).inc();
    }

    pub fn cleanup(&self, record_kind: &str, removed: usize) {
        self.cleanup_removed
            .get_or_create(&kind(record_kind))
            .inc_by(removed as u64);
    }

    pub fn verified(&self, checks: usize, verified: usize) {
        self.verify_checks.inc_by(checks as u64);
        self.verify_verified.inc_by(verified as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    #[test]
    fn test_counters_render() {
        let mut registry = Registry::default();
        let metrics = ProofMetrics::new(&mut registry);
        metrics.upsert("invoice");
        metrics.upsert("invoice");
        metrics.cleanup("file", 3);
        metrics.verified(5, 4);

        let mut out = String::new();
        encode(&mut out, &registry).unwrap();
        assert!(out.contains(r#"zkb_proof_upserts_total{kind="invoice"} 2"#));
        assert!(out.contains(r#"zkb_proof_cleanup_removed_total{kind="file"} 3"#));
        assert!(out.contains("zkb_proof_verify_verified_total 4"));
    }
}
