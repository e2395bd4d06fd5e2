//! Weighted random load balancing strategy.

use rand::Rng;

use crate::load_balancer::{instance::ServiceInstance, LoadBalancer};

/// Weighted random selector.
///
/// Draws `r` uniformly from `[0, W)` where `W` is the summed weight of the
/// selectable instances, then walks them subtracting each weight; the instance
/// that brings `r` to zero or below wins. Zero-weight instances are skipped
/// unless every candidate weighs zero, in which case the first is returned.
#[derive(Debug, Default)]
pub struct WeightedRandom;

impl WeightedRandom {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for WeightedRandom {
    fn pick<'a>(&self, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance> {
        let candidates: Vec<&ServiceInstance> =
            instances.iter().filter(|i| i.is_selectable()).collect();
        let first = *candidates.first()?;

        let total: u64 = candidates.iter().map(|i| i.weight as u64).sum();
        if total == 0 {
            return Some(first);
        }

        let mut r = rand::thread_rng().gen_range(0.0..total as f64);
        for &instance in &candidates {
            if instance.weight == 0 {
                continue;
            }
            r -= instance.weight as f64;
            if r <= 0.0 {
                return Some(instance);
            }
        }

        // Float rounding can leave a sliver above zero.
        Some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::instance::InstanceStatus;
    use url::Url;

    fn instance(host: &str, weight: u32) -> ServiceInstance {
        ServiceInstance::new("svc", vec![Url::parse(&format!("http://{}", host)).unwrap()])
            .with_weight(weight)
    }

    #[test]
    fn selection_is_proportional_to_weight() {
        let lb = WeightedRandom::new();
        let instances = vec![instance("light:1", 1), instance("heavy:1", 3)];

        let trials = 20_000;
        let heavy = (0..trials)
            .filter(|_| lb.pick(&instances).unwrap().weight == 3)
            .count();
        let share = heavy as f64 / trials as f64;
        assert!((0.72..0.78).contains(&share), "heavy share was {}", share);
    }

    #[test]
    fn never_picks_unselectable_instances() {
        let lb = WeightedRandom::new();
        let instances = vec![
            instance("down:1", 100).with_status(InstanceStatus::Unhealthy),
            instance("drain:1", 100).with_status(InstanceStatus::Draining),
            instance("up:1", 1),
        ];
        for _ in 0..200 {
            assert_eq!(lb.pick(&instances).unwrap().weight, 1);
        }
    }

    #[test]
    fn zero_weights_and_empty_sets() {
        let lb = WeightedRandom::new();
        assert!(lb.pick(&[]).is_none());

        let all_zero = vec![instance("a:1", 0), instance("b:1", 0)];
        let picked = lb.pick(&all_zero).unwrap();
        assert_eq!(picked.endpoints[0].host_str(), Some("a"));

        let mixed = vec![instance("zero:1", 0), instance("one:1", 1)];
        for _ in 0..100 {
            assert_eq!(lb.pick(&mixed).unwrap().weight, 1);
        }
    }
}
