use super::{HashRing, Member, TokenStrategy};
use crate::{DynamiteError, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Tokens per member unless configured otherwise.
pub const DEFAULT_REPLICAS: usize = 2;

/// Ring parameters. Every process routing for the same cluster must agree on
/// these and on the member list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingConfig {
    #[serde(default = "default_replicas")]
    pub replicas: usize,
    #[serde(default)]
    pub strategy: TokenStrategy,
}

fn default_replicas() -> usize {
    DEFAULT_REPLICAS
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            replicas: DEFAULT_REPLICAS,
            strategy: TokenStrategy::Deterministic,
        }
    }
}

/// A process-local view of cluster membership.
///
/// Readers take a cheap `Arc` snapshot of the ring; `join`/`leave` build a new
/// ring off to the side and swap it in under the write lock, so a lookup never
/// sees a half-updated ring.
pub struct ClusterView {
    config: RingConfig,
    ring: RwLock<Arc<HashRing>>,
}

impl ClusterView {
    /// Build a view over a static member list.
    pub fn new(members: &[Member], config: RingConfig) -> Result<Self> {
        if members.is_empty() {
            return Err(DynamiteError::EmptyRing(
                "cannot build a cluster view without members".to_string(),
            ));
        }

        let mut ring = HashRing::new();
        for member in members {
            ring.add(member, config.replicas, config.strategy)?;
        }

        tracing::info!(
            "Built cluster view: members={:?} tokens={} strategy={:?}",
            ring.members(),
            ring.size(),
            config.strategy
        );

        Ok(Self {
            config,
            ring: RwLock::new(Arc::new(ring)),
        })
    }

    /// Build the view a storage node uses: the static member list plus the
    /// node's own identity.
    pub fn for_node(members: &[Member], identity: &Member, config: RingConfig) -> Result<Self> {
        let mut all = members.to_vec();
        if !all.contains(identity) {
            all.push(identity.clone());
        }
        Self::new(&all, config)
    }

    pub fn owner_of(&self, key: &str) -> Result<Member> {
        self.snapshot().locate(key).cloned()
    }

    /// The current ring. Stays valid after later membership changes.
    pub fn snapshot(&self) -> Arc<HashRing> {
        self.ring
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn config(&self) -> RingConfig {
        self.config
    }

    pub fn members(&self) -> Vec<Member> {
        self.snapshot().members()
    }

    /// Add a member at runtime.
    pub fn join(&self, member: &Member) -> Result<()> {
        self.update(|ring| ring.add(member, self.config.replicas, self.config.strategy))?;
        tracing::info!("Member {} joined the cluster view", member);
        Ok(())
    }

    /// Remove a member at runtime.
    pub fn leave(&self, member: &Member) -> Result<()> {
        self.update(|ring| ring.remove(member))?;
        tracing::info!("Member {} left the cluster view", member);
        Ok(())
    }

    fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut HashRing) -> Result<()>,
    {
        let mut guard = self.ring.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = HashRing::clone(&guard);
        change(&mut next)?;
        *guard = Arc::new(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(names: &[&str]) -> Vec<Member> {
        names.iter().map(|name| Member::from(*name)).collect()
    }

    #[test]
    fn test_empty_member_list_fails() {
        let result = ClusterView::new(&[], RingConfig::default());
        assert!(matches!(result, Err(DynamiteError::EmptyRing(_))));
    }

    #[test]
    fn test_size_is_replicas_times_members() {
        let config = RingConfig {
            replicas: 3,
            strategy: TokenStrategy::Deterministic,
        };
        let view = ClusterView::new(&members(&["a:1", "b:1", "c:1"]), config).unwrap();
        let ring = view.snapshot();
        assert_eq!(ring.size(), 9);
        assert!(ring.is_consistent());
    }

    #[test]
    fn test_node_view_includes_self_once() {
        let me = Member::from("10.0.0.3:25000");
        let view = ClusterView::for_node(
            &members(&["10.0.0.1:25000", "10.0.0.2:25000"]),
            &me,
            RingConfig::default(),
        )
        .unwrap();
        assert_eq!(view.members().len(), 3);
        assert!(view.snapshot().contains(&me));

        let again = ClusterView::for_node(&view.members(), &me, RingConfig::default()).unwrap();
        assert_eq!(again.members().len(), 3);
    }

    #[test]
    fn test_duplicate_static_member_fails() {
        let result = ClusterView::new(&members(&["a:1", "a:1"]), RingConfig::default());
        assert!(matches!(result, Err(DynamiteError::DuplicateMember(_))));
    }

    #[test]
    fn test_owner_of_matches_ring() {
        let view = ClusterView::new(&members(&["a:1", "b:1"]), RingConfig::default()).unwrap();
        let ring = view.snapshot();
        for i in 0..50 {
            let key = format!("k{}", i);
            assert_eq!(&view.owner_of(&key).unwrap(), ring.locate(&key).unwrap());
        }
    }

    #[test]
    fn test_join_and_leave_swap_snapshots() {
        let view = ClusterView::new(&members(&["a:1", "b:1"]), RingConfig::default()).unwrap();
        let before = view.snapshot();

        view.join(&Member::from("c:1")).unwrap();
        assert_eq!(view.snapshot().size(), 6);
        // Old snapshots are unaffected.
        assert_eq!(before.size(), 4);

        view.leave(&Member::from("c:1")).unwrap();
        assert_eq!(view.snapshot().sorted_tokens(), before.sorted_tokens());

        assert!(matches!(
            view.leave(&Member::from("c:1")),
            Err(DynamiteError::UnknownMember(_))
        ));
        assert!(matches!(
            view.join(&Member::from("a:1")),
            Err(DynamiteError::DuplicateMember(_))
        ));
    }
}
