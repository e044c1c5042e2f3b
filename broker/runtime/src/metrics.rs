use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    admissions: Family<OutcomeLabels, Counter>,
    exchanges: Family<StatusLabels, Counter>,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct OutcomeLabels {
    outcome: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct StatusLabels {
    status: &'static str,
}

// === impl Metrics ===

impl Metrics {
    pub(crate) fn register(reg: &mut Registry) -> Self {
        let admissions = Family::<OutcomeLabels, Counter>::default();
        reg.register(
            "admission_reviews",
            "Total number of admission reviews handled, by outcome",
            admissions.clone(),
        );

        let exchanges = Family::<StatusLabels, Counter>::default();
        reg.register(
            "credential_exchanges",
            "Total number of credential exchanges handled, by status",
            exchanges.clone(),
        );

        Self {
            admissions,
            exchanges,
        }
    }

    pub(crate) fn admitted(&self, outcome: &'static str) {
        self.admissions
            .get_or_create(&OutcomeLabels { outcome })
            .inc();
    }

    pub(crate) fn exchanged(&self, status: &'static str) {
        self.exchanges.get_or_create(&StatusLabels { status }).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_label() {
        let mut reg = Registry::default();
        let metrics = Metrics::register(&mut reg);
        metrics.admitted("mutated");
        metrics.admitted("mutated");
        metrics.exchanged("not_found");

        let mut text = String::new();
        prometheus_client::encoding::text::encode(&mut text, &reg).unwrap();
        assert!(text.contains("admission_reviews_total{outcome=\"mutated\"} 2"));
        assert!(text.contains("credential_exchanges_total{status=\"not_found\"} 1"));
    }
}
