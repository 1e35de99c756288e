//! Drain scheduling
//!
//! Turns a discovered container set into a [`Timeline`] of route-out,
//! kill, route-in and sleep actions on a virtual clock. The scheduler never
//! reads wall-clock time and never touches a process, so a plan is fully
//! determined by the container order.
//!
//! Cooldown: before every inter-container sleep the scheduler looks at the
//! container that will be drained next. If its service instance was killed
//! less than `min_kill_interval` seconds ago, the sleep is stretched to
//! `min_kill_interval - gap + between_containers_grace`, so two kills of the
//! same service instance are never closer than `min_kill_interval`.

use crate::error::{DrainError, Result};
use crate::history::DrainHistory;
use crate::models::{
    Container, DrainAction, DrainCycle, ScheduledAction, ServiceInstanceKey, SkippedContainer,
    Timeline,
};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, info};

/// Timing policy for a drain run, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DrainPolicy {
    /// Time for in-flight requests to finish after route-out (default: 10)
    #[serde(default = "default_smartstack_grace")]
    pub smartstack_grace_secs: u64,
    /// Base pause between two container cycles (default: 10)
    #[serde(default = "default_between_containers_grace")]
    pub between_containers_grace_secs: u64,
    /// Minimum gap between kills of the same service instance (default: 60)
    #[serde(default = "default_min_kill_interval")]
    pub min_kill_interval_secs: u64,
    /// Expiry of the route-out entry in the routing layer (default: 120)
    #[serde(default = "default_route_expiry")]
    pub route_expiry_secs: u64,
}

/// Upper bound for every policy duration (one week)
pub const MAX_POLICY_SECS: u64 = 7 * 24 * 60 * 60;

fn default_smartstack_grace() -> u64 {
    10
}

fn default_between_containers_grace() -> u64 {
    10
}

fn default_min_kill_interval() -> u64 {
    60
}

fn default_route_expiry() -> u64 {
    120
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            smartstack_grace_secs: default_smartstack_grace(),
            between_containers_grace_secs: default_between_containers_grace(),
            min_kill_interval_secs: default_min_kill_interval(),
            route_expiry_secs: default_route_expiry(),
        }
    }
}

impl DrainPolicy {
    /// Check the policy before any discovery happens
    ///
    /// The route-out entry must outlive the grace period, otherwise traffic
    /// returns to the container before it is killed.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("smartstack grace", self.smartstack_grace_secs),
            ("between-containers grace", self.between_containers_grace_secs),
            ("min kill interval", self.min_kill_interval_secs),
            ("route expiry", self.route_expiry_secs),
        ];
        for (name, secs) in fields {
            if secs > MAX_POLICY_SECS {
                return Err(DrainError::InvalidPolicy(format!(
                    "{} ({}s) exceeds the maximum of {}s",
                    name, secs, MAX_POLICY_SECS
                )));
            }
        }

        if self.route_expiry_secs < self.smartstack_grace_secs {
            return Err(DrainError::InvalidPolicy(format!(
                "route expiry ({}s) is shorter than the smartstack grace ({}s)",
                self.route_expiry_secs, self.smartstack_grace_secs
            )));
        }
        Ok(())
    }
}

/// Shuffle containers with an explicit random source
pub fn shuffle_containers<R: Rng + ?Sized>(
    mut containers: Vec<Container>,
    rng: &mut R,
) -> Vec<Container> {
    containers.shuffle(rng);
    containers
}

/// Sequential drain planner over a virtual clock
pub struct DrainScheduler {
    policy: DrainPolicy,
    history: DrainHistory,
    clock: u64,
}

impl DrainScheduler {
    /// Create a scheduler with an empty history and the clock at zero
    pub fn new(policy: DrainPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            policy,
            history: DrainHistory::new(),
            clock: 0,
        })
    }

    pub fn policy(&self) -> &DrainPolicy {
        &self.policy
    }

    /// Shuffle the containers and schedule them
    pub fn plan<R: Rng + ?Sized>(
        self,
        containers: Vec<Container>,
        skipped: Vec<SkippedContainer>,
        rng: &mut R,
    ) -> Timeline {
        let ordered = shuffle_containers(containers, rng);
        self.schedule(ordered, skipped)
    }

    /// Schedule containers in the given order
    pub fn schedule(mut self, ordered: Vec<Container>, skipped: Vec<SkippedContainer>) -> Timeline {
        let mut cycles = Vec::with_capacity(ordered.len());
        let mut queue = ordered.into_iter().peekable();

        while let Some(container) = queue.next() {
            let next_key = queue.peek().map(Container::key);
            cycles.push(self.schedule_container(container, next_key.as_ref()));
        }

        info!(
            containers = cycles.len(),
            skipped = skipped.len(),
            duration_secs = self.clock,
            "Drain plan complete"
        );

        Timeline {
            cycles,
            skipped,
            ends_at: self.clock,
        }
    }

    fn schedule_container(
        &mut self,
        container: Container,
        next_key: Option<&ServiceInstanceKey>,
    ) -> DrainCycle {
        let key = container.key();
        let mut actions = Vec::with_capacity(5);

        if container.is_routed() {
            self.push(
                &mut actions,
                &container,
                DrainAction::RouteOut {
                    key: key.clone(),
                    port: container.host_port,
                    expire_secs: self.policy.route_expiry_secs,
                },
            );
        }

        self.sleep(&mut actions, &container, self.policy.smartstack_grace_secs);

        let killed_at = self.clock;
        self.push(
            &mut actions,
            &container,
            DrainAction::Kill {
                container_id: container.id.clone(),
            },
        );

        // Routing is restored right after the kill; the routing layer's own
        // health checks evict the dead backend.
        if container.is_routed() {
            self.push(
                &mut actions,
                &container,
                DrainAction::RouteIn {
                    key: key.clone(),
                    port: container.host_port,
                },
            );
        }

        let previous_kill = self.history.last_kill_time(&key);
        self.history.record_kill(key.clone(), killed_at);

        let pause = self.cooldown_sleep(next_key);
        self.sleep(&mut actions, &container, pause);

        debug!(
            container_id = %container.id,
            key = %key,
            killed_at,
            previous_kill = ?previous_kill,
            pause_secs = pause,
            routed = container.is_routed(),
            "Scheduled container drain"
        );

        DrainCycle {
            container,
            previous_kill,
            killed_at,
            actions,
        }
    }

    /// Pause before the next cycle, stretched if the next key is still cooling down
    fn cooldown_sleep(&self, next_key: Option<&ServiceInstanceKey>) -> u64 {
        let base = self.policy.between_containers_grace_secs;
        let min = self.policy.min_kill_interval_secs;

        match next_key.and_then(|k| self.history.since_last_kill(k, self.clock)) {
            Some(gap) if gap < min => (min - gap).saturating_add(base),
            _ => base,
        }
    }

    fn sleep(&mut self, actions: &mut Vec<ScheduledAction>, container: &Container, secs: u64) {
        self.push(actions, container, DrainAction::Sleep { secs });
        self.clock = self.clock.saturating_add(secs);
    }

    fn push(&self, actions: &mut Vec<ScheduledAction>, container: &Container, action: DrainAction) {
        actions.push(ScheduledAction {
            at: self.clock,
            container_id: container.id.clone(),
            action,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{BTreeMap, HashMap};

    fn container(id: &str, service: &str, instance: &str, proxy_port: Option<u16>) -> Container {
        Container {
            id: id.to_string(),
            service: service.to_string(),
            instance: instance.to_string(),
            host_port: 31000,
            proxy_port,
            env: BTreeMap::new(),
        }
    }

    fn sleeps(cycle: &DrainCycle) -> Vec<u64> {
        cycle
            .actions
            .iter()
            .filter_map(|a| match a.action {
                DrainAction::Sleep { secs } => Some(secs),
                _ => None,
            })
            .collect()
    }

    fn fleet() -> Vec<Container> {
        vec![
            container("aaaaaaaaaaa1", "api", "main", Some(20001)),
            container("aaaaaaaaaaa2", "api", "main", Some(20001)),
            container("aaaaaaaaaaa3", "api", "main", Some(20001)),
            container("bbbbbbbbbbb1", "web", "main", Some(20002)),
            container("bbbbbbbbbbb2", "web", "canary", None),
            container("ccccccccccc1", "batch", "worker", None),
            container("ccccccccccc2", "batch", "worker", None),
        ]
    }

    #[test]
    fn test_two_replicas_stretch_sleep() {
        let scheduler = DrainScheduler::new(DrainPolicy::default()).unwrap();
        let timeline = scheduler.schedule(
            vec![
                container("aaaaaaaaaaa1", "api", "main", Some(20001)),
                container("aaaaaaaaaaa2", "api", "main", Some(20001)),
            ],
            Vec::new(),
        );

        assert_eq!(timeline.cycles[0].killed_at, 10);
        assert_eq!(sleeps(&timeline.cycles[0]), vec![10, 70]);
        assert_eq!(timeline.cycles[1].killed_at, 90);
        assert_eq!(timeline.cycles[1].previous_kill, Some(10));
        assert_eq!(sleeps(&timeline.cycles[1]), vec![10, 10]);
        assert_eq!(timeline.ends_at, 100);
    }

    #[test]
    fn test_distinct_keys_use_base_sleep() {
        let scheduler = DrainScheduler::new(DrainPolicy::default()).unwrap();
        let timeline = scheduler.schedule(
            vec![
                container("aaaaaaaaaaa1", "api", "main", Some(20001)),
                container("bbbbbbbbbbb1", "web", "main", Some(20002)),
            ],
            Vec::new(),
        );

        assert_eq!(sleeps(&timeline.cycles[0]), vec![10, 10]);
        assert_eq!(timeline.cycles[1].killed_at, 30);
        assert_eq!(timeline.cycles[1].previous_kill, None);
    }

    #[test]
    fn test_interleaved_replica_is_stretched_by_remaining_cooldown() {
        let scheduler = DrainScheduler::new(DrainPolicy::default()).unwrap();
        let timeline = scheduler.schedule(
            vec![
                container("aaaaaaaaaaa1", "api", "main", None),
                container("bbbbbbbbbbb1", "web", "main", None),
                container("aaaaaaaaaaa2", "api", "main", None),
            ],
            Vec::new(),
        );

        // api.main killed at 10, web.main at 30; gap 20 before the next api.main
        assert_eq!(sleeps(&timeline.cycles[1]), vec![10, 50]);
        assert_eq!(timeline.cycles[2].killed_at, 90);
    }

    #[test]
    fn test_cycle_action_order() {
        let scheduler = DrainScheduler::new(DrainPolicy::default()).unwrap();
        let timeline = scheduler.schedule(
            vec![container("aaaaaaaaaaa1", "api", "main", Some(20001))],
            Vec::new(),
        );

        let kinds: Vec<_> = timeline.actions().map(|a| a.action.kind()).collect();
        assert_eq!(kinds, vec!["route_out", "sleep", "kill", "route_in", "sleep"]);

        let ats: Vec<_> = timeline.actions().map(|a| a.at).collect();
        assert_eq!(ats, vec![0, 0, 10, 10, 10]);

        match &timeline.cycles[0].actions[0].action {
            DrainAction::RouteOut {
                port, expire_secs, ..
            } => {
                assert_eq!(*port, 31000);
                assert_eq!(*expire_secs, 120);
            }
            other => panic!("expected route-out, got {:?}", other),
        }
    }

    #[test]
    fn test_unrouted_container_still_killed() {
        let scheduler = DrainScheduler::new(DrainPolicy::default()).unwrap();
        let timeline = scheduler.schedule(
            vec![container("ccccccccccc1", "batch", "worker", None)],
            Vec::new(),
        );

        let kinds: Vec<_> = timeline.actions().map(|a| a.action.kind()).collect();
        assert_eq!(kinds, vec!["sleep", "kill", "sleep"]);
        assert_eq!(timeline.cycles[0].killed_at, 10);
    }

    #[test]
    fn test_cooldown_invariant_holds_for_any_order() {
        let policy = DrainPolicy::default();
        let min = policy.min_kill_interval_secs;

        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let timeline = DrainScheduler::new(policy.clone())
                .unwrap()
                .plan(fleet(), Vec::new(), &mut rng);

            let mut last: HashMap<ServiceInstanceKey, u64> = HashMap::new();
            for (key, at) in timeline.kills() {
                if let Some(prev) = last.insert(key.clone(), at) {
                    assert!(
                        at - prev >= min,
                        "seed {}: {} killed at {} and {}",
                        seed,
                        key,
                        prev,
                        at
                    );
                }
            }
        }
    }

    #[test]
    fn test_cooldown_invariant_with_tight_policy() {
        let policy = DrainPolicy {
            smartstack_grace_secs: 1,
            between_containers_grace_secs: 0,
            min_kill_interval_secs: 300,
            route_expiry_secs: 5,
        };

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let timeline = DrainScheduler::new(policy.clone())
                .unwrap()
                .plan(fleet(), Vec::new(), &mut rng);

            let mut last: HashMap<ServiceInstanceKey, u64> = HashMap::new();
            for (key, at) in timeline.kills() {
                if let Some(prev) = last.insert(key, at) {
                    assert!(at - prev >= 300);
                }
            }
        }
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = StdRng::seed_from_u64(7);
        let shuffled = shuffle_containers(fleet(), &mut rng);

        let mut expected: Vec<_> = fleet().into_iter().map(|c| c.id).collect();
        let mut actual: Vec<_> = shuffled.into_iter().map(|c| c.id).collect();
        expected.sort();
        actual.sort();
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_same_seed_same_timeline() {
        let plan = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            DrainScheduler::new(DrainPolicy::default())
                .unwrap()
                .plan(fleet(), Vec::new(), &mut rng)
        };

        assert_eq!(plan(42), plan(42));
    }

    #[test]
    fn test_skipped_containers_are_carried() {
        let skipped = vec![SkippedContainer {
            id: "ddddddddddd1".to_string(),
            reason: "missing PAASTA_SERVICE".to_string(),
        }];
        let timeline = DrainScheduler::new(DrainPolicy::default())
            .unwrap()
            .schedule(Vec::new(), skipped.clone());

        assert!(timeline.is_empty());
        assert_eq!(timeline.skipped, skipped);
        assert_eq!(timeline.ends_at, 0);
    }

    #[test]
    fn test_policy_rejects_short_expiry() {
        let policy = DrainPolicy {
            smartstack_grace_secs: 30,
            route_expiry_secs: 20,
            ..DrainPolicy::default()
        };

        assert!(matches!(
            DrainScheduler::new(policy),
            Err(DrainError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_policy_rejects_oversized_durations() {
        let huge = i64::MAX as u64;
        let policies = [
            DrainPolicy {
                between_containers_grace_secs: huge,
                ..DrainPolicy::default()
            },
            DrainPolicy {
                min_kill_interval_secs: huge,
                ..DrainPolicy::default()
            },
            DrainPolicy {
                smartstack_grace_secs: MAX_POLICY_SECS + 1,
                route_expiry_secs: MAX_POLICY_SECS + 1,
                ..DrainPolicy::default()
            },
            DrainPolicy {
                route_expiry_secs: u64::MAX,
                ..DrainPolicy::default()
            },
        ];

        for policy in policies {
            assert!(
                matches!(
                    DrainScheduler::new(policy.clone()),
                    Err(DrainError::InvalidPolicy(_))
                ),
                "accepted {:?}",
                policy
            );
        }
    }

    #[test]
    fn test_largest_policy_schedules_without_overflow() {
        let policy = DrainPolicy {
            smartstack_grace_secs: MAX_POLICY_SECS,
            between_containers_grace_secs: MAX_POLICY_SECS,
            min_kill_interval_secs: MAX_POLICY_SECS,
            route_expiry_secs: MAX_POLICY_SECS,
        };
        let timeline = DrainScheduler::new(policy).unwrap().schedule(
            vec![
                container("aaaaaaaaaaa1", "api", "main", None),
                container("bbbbbbbbbbb1", "web", "main", None),
                container("aaaaaaaaaaa2", "api", "main", None),
            ],
            Vec::new(),
        );

        let kills: Vec<_> = timeline.cycles.iter().map(|c| c.killed_at).collect();
        assert!(kills.windows(2).all(|w| w[0] < w[1]));
        assert!(kills[2] - kills[0] >= MAX_POLICY_SECS);
    }
}
