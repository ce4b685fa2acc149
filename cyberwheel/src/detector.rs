// src/detector.rs
//
// Detectors turn red action outcomes into alerts for the blue observation.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

use crate::config::DetectorConfig;
use crate::network::NetworkModel;
use crate::red_agent::RedOutcome;
use crate::types::Alert;

pub trait Detector: Send {
    fn reset(&mut self) {}

    fn observe(&mut self, outcome: &RedOutcome, net: &NetworkModel, rng: &mut dyn RngCore)
        -> Vec<Alert>;
}

pub fn build_detector(cfg: &DetectorConfig) -> Box<dyn Detector> {
    match *cfg {
        DetectorConfig::Perfect => Box::new(PerfectDetector),
        DetectorConfig::Probabilistic {
            true_positive_rate,
            false_positive_rate,
        } => Box::new(ProbabilisticDetector {
            true_positive_rate,
            false_positive_rate,
        }),
    }
}

fn alert_for(outcome: &RedOutcome) -> Option<Alert> {
    if !outcome.executed() {
        return None;
    }
    Some(Alert {
        src_host: outcome.src_host.clone(),
        dst_host: Some(outcome.target_host.clone()),
    })
}

/// Sees every executed red action.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerfectDetector;

impl Detector for PerfectDetector {
    fn observe(&mut self, outcome: &RedOutcome, _: &NetworkModel, _: &mut dyn RngCore) -> Vec<Alert> {
        alert_for(outcome).into_iter().collect()
    }
}

/// Misses some activity and raises occasional false alarms.
///
/// Activity touching a decoy is always reported.
#[derive(Debug, Clone, Copy)]
pub struct ProbabilisticDetector {
    pub true_positive_rate: f64,
    pub false_positive_rate: f64,
}

impl Detector for ProbabilisticDetector {
    fn observe(
        &mut self,
        outcome: &RedOutcome,
        net: &NetworkModel,
        rng: &mut dyn RngCore,
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();
        if let Some(alert) = alert_for(outcome) {
            if outcome.target_is_decoy || rng.gen::<f64>() < self.true_positive_rate {
                alerts.push(alert);
            }
        }
        if rng.gen::<f64>() < self.false_positive_rate {
            let base = &net.hosts()[..net.num_base_hosts()];
            if let Some(host) = base.choose(rng) {
                alerts.push(Alert {
                    src_host: host.name.clone(),
                    dst_host: None,
                });
            }
        }
        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvConfig;
    use crate::killchain::KillChainPhase;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn outcome(phase: Option<KillChainPhase>, valid: bool, decoy: bool) -> RedOutcome {
        RedOutcome {
            phase,
            src_host: "user0".to_string(),
            target_host: "server0".to_string(),
            valid,
            success: valid,
            target_is_decoy: decoy,
            swept_hosts: Vec::new(),
        }
    }

    #[test]
    fn perfect_detector_reports_executed_actions_only() {
        let net = NetworkModel::build(&EnvConfig::example().network, 1);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut det = PerfectDetector;

        let alerts = det.observe(&outcome(Some(KillChainPhase::PortScan), true, false), &net, &mut rng);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].src_host, "user0");
        assert_eq!(alerts[0].dst_host.as_deref(), Some("server0"));

        assert!(det.observe(&outcome(Some(KillChainPhase::Impact), false, false), &net, &mut rng).is_empty());
        assert!(det.observe(&outcome(None, true, false), &net, &mut rng).is_empty());
    }

    #[test]
    fn probabilistic_detector_always_sees_decoys() {
        let net = NetworkModel::build(&EnvConfig::example().network, 1);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut det = ProbabilisticDetector {
            true_positive_rate: 0.0,
            false_positive_rate: 0.0,
        };
        for _ in 0..10 {
            assert!(det
                .observe(&outcome(Some(KillChainPhase::PingSweep), true, false), &net, &mut rng)
                .is_empty());
            assert_eq!(
                det.observe(&outcome(Some(KillChainPhase::PingSweep), true, true), &net, &mut rng)
                    .len(),
                1
            );
        }
    }

    #[test]
    fn probabilistic_detector_false_alarms_hit_base_hosts() {
        let net = NetworkModel::build(&EnvConfig::example().network, 1);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut det = ProbabilisticDetector {
            true_positive_rate: 1.0,
            false_positive_rate: 1.0,
        };
        let alerts = det.observe(&outcome(None, false, false), &net, &mut rng);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].dst_host.is_none());
        assert!(net.host_idx(&alerts[0].src_host).is_some());
    }
}
