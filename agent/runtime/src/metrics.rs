use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::{Registry, Unit},
};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct CycleMetrics {
    cycles: Family<OutcomeLabels, Counter>,
    stage_failures: Family<StageLabels, Counter>,
    duration: Histogram,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct OutcomeLabels {
    outcome: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct StageLabels {
    stage: &'static str,
}

// === impl CycleMetrics ===

impl CycleMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let cycles = Family::<OutcomeLabels, Counter>::default();
        reg.register(
            "cycles",
            "Total number of discovery cycles by outcome",
            cycles.clone(),
        );

        let stage_failures = Family::<StageLabels, Counter>::default();
        reg.register(
            "stage_failures",
            "Total number of cycle stages that failed",
            stage_failures.clone(),
        );

        // Cycles on large clusters take minutes.
        let duration = Histogram::new([1.0, 10.0, 60.0, 300.0, 900.0, 3600.0]);
        reg.register_with_unit(
            "duration",
            "Histogram of completed cycle durations",
            Unit::Seconds,
            duration.clone(),
        );

        Self {
            cycles,
            stage_failures,
            duration,
        }
    }

    pub(crate) fn completed(&self, elapsed: Duration) {
        self.cycles
            .get_or_create(&OutcomeLabels {
                outcome: "completed",
            })
            .inc();
        self.duration.observe(elapsed.as_secs_f64());
    }

    pub(crate) fn unreachable(&self) {
        self.cycles
            .get_or_create(&OutcomeLabels {
                outcome: "unreachable",
            })
            .inc();
    }

    pub(crate) fn stage_failed(&self, stage: &'static str) {
        self.stage_failures
            .get_or_create(&StageLabels { stage })
            .inc();
    }
}

impl Default for CycleMetrics {
    fn default() -> Self {
        Self::register(&mut Registry::default())
    }
}
