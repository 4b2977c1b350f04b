use actuator_link::Modality;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct BehaviorMetrics {
    pub goals_issued: IntCounterVec,
    pub goals_cancelled: IntCounterVec,
    pub plans_started: IntCounter,
    pub plans_preempted: IntCounter,
    pub outstanding_handles: IntGauge,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub behavior: BehaviorMetrics,
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let goals_issued = IntCounterVec::new(
            Opts::new("sr_goals_issued", "Actuator goals issued"),
            &["modality"],
        )
        .map_err(|e| format!("metrics init error: {e}"))?;
        let goals_cancelled = IntCounterVec::new(
            Opts::new("sr_goals_cancelled", "Actuator goals that ended cancelled"),
            &["modality"],
        )
        .map_err(|e| format!("metrics init error: {e}"))?;
        let plans_started = IntCounter::new("sr_plans_started", "Audience-directed utterances started")
            .map_err(|e| format!("metrics init error: {e}"))?;
        let plans_preempted =
            IntCounter::new("sr_plans_preempted", "Audience-directed utterances cancelled")
                .map_err(|e| format!("metrics init error: {e}"))?;
        let outstanding_handles =
            IntGauge::new("sr_outstanding_handles", "Action handles not yet retired")
                .map_err(|e| format!("metrics init error: {e}"))?;
        let behavior = BehaviorMetrics {
            goals_issued,
            goals_cancelled,
            plans_started,
            plans_preempted,
            outstanding_handles,
        };
        let _ = registry.register(Box::new(behavior.goals_issued.clone()));
        let _ = registry.register(Box::new(behavior.goals_cancelled.clone()));
        let _ = registry.register(Box::new(behavior.plans_started.clone()));
        let _ = registry.register(Box::new(behavior.plans_preempted.clone()));
        let _ = registry.register(Box::new(behavior.outstanding_handles.clone()));
        Ok(Self { registry, behavior })
    }

    pub(crate) fn goal_issued(&self, modality: Modality) {
        self.behavior
            .goals_issued
            .with_label_values(&[&modality.to_string()])
            .inc();
    }

    pub(crate) fn goal_cancelled(&self, modality: Modality) {
        self.behavior
            .goals_cancelled
            .with_label_values(&[&modality.to_string()])
            .inc();
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_in_text_format() {
        let hub = MetricsHub::new().unwrap();
        hub.goal_issued(Modality::Gaze);
        hub.goal_issued(Modality::Gaze);
        hub.behavior.plans_started.inc();
        let text = hub.encode_text();
        assert!(text.contains(r#"sr_goals_issued{modality="gaze"} 2"#));
        assert!(text.contains("sr_plans_started 1"));
    }
}
