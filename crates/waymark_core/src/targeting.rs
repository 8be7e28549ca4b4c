//! Range targets and movement-notice subscriptions.
//!
//! A [`RangeTarget`] is a weak handle: the entity owns itself and may vanish
//! at any time. The watcher only keeps the id and the subscription it took
//! out on the target's movement notices, and must release that subscription
//! when it lets go of the target.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::EntityId;
use crate::math::Vec2Fixed;

/// Handle for one movement-notice subscription.
pub type SubscriptionId = u64;

/// Weak reference to an entity tracked as a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeTarget {
    /// Target entity.
    pub entity: EntityId,
    /// Movement-notice subscription held on the target.
    pub subscription: SubscriptionId,
}

/// Live view of a target, looked up through the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetView {
    /// Current position.
    pub position: Vec2Fixed,
    /// Whether the target is walking a path.
    pub moving: bool,
}

/// Registry of who watches whom.
#[derive(Debug, Clone, Default)]
pub struct TargetSubscriptions {
    next_id: SubscriptionId,
    /// target -> subscription -> watcher
    by_target: BTreeMap<EntityId, BTreeMap<SubscriptionId, EntityId>>,
}

impl TargetSubscriptions {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `watcher` to movement notices of `target`.
    pub fn subscribe(&mut self, watcher: EntityId, target: EntityId) -> RangeTarget {
        let subscription = self.next_id;
        self.next_id += 1;
        self.by_target
            .entry(target)
            .or_default()
            .insert(subscription, watcher);
        RangeTarget {
            entity: target,
            subscription,
        }
    }

    /// Release a subscription. Returns `false` if it was already gone.
    pub fn release(&mut self, handle: &RangeTarget) -> bool {
        let Some(watchers) = self.by_target.get_mut(&handle.entity) else {
            return false;
        };
        let removed = watchers.remove(&handle.subscription).is_some();
        if watchers.is_empty() {
            self.by_target.remove(&handle.entity);
        }
        removed
    }

    /// Watchers of `target`, in subscription order.
    #[must_use]
    pub fn watchers_of(&self, target: EntityId) -> Vec<EntityId> {
        self.by_target
            .get(&target)
            .map(|watchers| watchers.values().copied().collect())
            .unwrap_or_default()
    }

    /// Total live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_target.values().map(BTreeMap::len).sum()
    }

    /// True when nobody watches anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }
}

/// Per-unit targeting state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Targeting {
    /// Explicit target, if any.
    pub target: Option<RangeTarget>,
    /// The target moved since the last evaluation.
    pub replan_pending: bool,
    /// Currently engaging the target.
    pub engaged: bool,
}

impl Targeting {
    /// Track a new target, releasing any previous one.
    pub fn set(&mut self, subs: &mut TargetSubscriptions, watcher: EntityId, target: EntityId) {
        self.clear(subs);
        self.target = Some(subs.subscribe(watcher, target));
    }

    /// Drop the tracked target and release its subscription.
    ///
    /// Safe to call any number of times. Returns the target that was cleared.
    pub fn clear(&mut self, subs: &mut TargetSubscriptions) -> Option<EntityId> {
        self.replan_pending = false;
        self.engaged = false;
        let handle = self.target.take()?;
        subs.release(&handle);
        Some(handle.entity)
    }

    /// Handle a movement notice from `target`. Stale notices are ignored.
    pub fn notice_moved(&mut self, target: EntityId) {
        if self.target.is_some_and(|t| t.entity == target) {
            self.replan_pending = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_and_release() {
        let mut subs = TargetSubscriptions::new();
        let a = subs.subscribe(1, 10);
        let b = subs.subscribe(2, 10);
        assert_eq!(subs.watchers_of(10), vec![1, 2]);
        assert_eq!(subs.len(), 2);

        assert!(subs.release(&a));
        assert!(!subs.release(&a));
        assert_eq!(subs.watchers_of(10), vec![2]);

        assert!(subs.release(&b));
        assert!(subs.is_empty());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut subs = TargetSubscriptions::new();
        let mut targeting = Targeting::default();
        targeting.set(&mut subs, 1, 10);
        targeting.engaged = true;

        assert_eq!(targeting.clear(&mut subs), Some(10));
        assert_eq!(targeting.clear(&mut subs), None);
        assert!(!targeting.engaged);
        assert!(subs.is_empty());
    }

    #[test]
    fn test_retarget_releases_previous() {
        let mut subs = TargetSubscriptions::new();
        let mut targeting = Targeting::default();
        targeting.set(&mut subs, 1, 10);
        targeting.set(&mut subs, 1, 11);
        assert!(subs.watchers_of(10).is_empty());
        assert_eq!(subs.watchers_of(11), vec![1]);
    }

    #[test]
    fn test_notice_only_for_current_target() {
        let mut subs = TargetSubscriptions::new();
        let mut targeting = Targeting::default();
        targeting.notice_moved(10);
        assert!(!targeting.replan_pending);

        targeting.set(&mut subs, 1, 10);
        targeting.notice_moved(11);
        assert!(!targeting.replan_pending);
        targeting.notice_moved(10);
        assert!(targeting.replan_pending);
    }
}
