//! Agent sets and the snapshot-isolated shufflerator

use rand::Rng;
use rand::rngs::StdRng;

use super::kind::{AgentKind, AgentRef};

/// An ordered collection of agents of one kind.
///
/// Concurrent jobs may append to the backing array mid-run; exclusive
/// iteration goes through [`AgentSet::shufflerator`], which snapshots
/// membership at creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSet {
    kind: AgentKind,
    members: Vec<AgentRef>,
}

impl AgentSet {
    /// Empty agent set of the given kind.
    pub fn new(kind: AgentKind) -> Self {
        Self {
            kind,
            members: Vec::new(),
        }
    }

    /// Agent set over the given handles.
    pub fn from_refs(kind: AgentKind, members: Vec<AgentRef>) -> Self {
        Self { kind, members }
    }

    /// The kind of agent this set holds.
    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    /// Append an agent. Append is the only growth operation; members are
    /// never removed, dead agents are skipped at iteration time.
    pub fn push(&mut self, agent: AgentRef) {
        self.members.push(agent);
    }

    /// Members in insertion order, including any that have since died.
    pub fn members(&self) -> &[AgentRef] {
        &self.members
    }

    /// Number of members still alive.
    pub fn count(&self) -> usize {
        self.members.iter().filter(|a| !a.is_dead()).count()
    }

    /// Iterate live members in insertion order.
    pub fn iter_live(&self) -> impl Iterator<Item = &AgentRef> {
        self.members.iter().filter(|a| !a.is_dead())
    }

    /// Randomized snapshot iterator.
    ///
    /// The membership snapshot is taken here: agents added to this set
    /// after the call are never yielded, and agents that die before their
    /// turn are skipped. This is the iterator contract exclusive jobs rely
    /// on for read-snapshot semantics.
    pub fn shufflerator(&self, rng: &mut StdRng) -> Shufflerator {
        let mut order: Vec<AgentRef> = self
            .members
            .iter()
            .filter(|a| !a.is_dead())
            .cloned()
            .collect();
        // Fisher-Yates over the snapshot
        for i in (1..order.len()).rev() {
            let j = rng.gen_range(0..=i);
            order.swap(i, j);
        }
        Shufflerator { order, next: 0 }
    }
}

/// Randomized, snapshot-isolated iterator over an agent set.
#[derive(Debug)]
pub struct Shufflerator {
    order: Vec<AgentRef>,
    next: usize,
}

impl Iterator for Shufflerator {
    type Item = AgentRef;

    fn next(&mut self) -> Option<AgentRef> {
        while self.next < self.order.len() {
            let agent = self.order[self.next].clone();
            self.next += 1;
            if !agent.is_dead() {
                return Some(agent);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::kind::AgentCell;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn turtle(id: i64) -> AgentRef {
        AgentRef::new(AgentKind::Turtle, Arc::new(AgentCell::new(id)))
    }

    #[test]
    fn test_shufflerator_yields_every_live_member_once() {
        let set = AgentSet::from_refs(AgentKind::Turtle, (0..10).map(turtle).collect());
        let mut rng = StdRng::seed_from_u64(1);
        let mut ids: Vec<i64> = set.shufflerator(&mut rng).map(|a| a.id()).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_shufflerator_excludes_members_added_after_snapshot() {
        let mut set = AgentSet::from_refs(AgentKind::Turtle, (0..3).map(turtle).collect());
        let mut rng = StdRng::seed_from_u64(1);
        let shuf = set.shufflerator(&mut rng);
        set.push(turtle(99));
        let ids: Vec<i64> = shuf.map(|a| a.id()).collect();
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(&99));
    }

    #[test]
    fn test_shufflerator_skips_agents_dying_mid_iteration() {
        let a = turtle(0);
        let b = turtle(1);
        let c = turtle(2);
        let set =
            AgentSet::from_refs(AgentKind::Turtle, vec![a.clone(), b.clone(), c.clone()]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut shuf = set.shufflerator(&mut rng);

        let first = shuf.next().unwrap();
        // Kill everyone else; the iterator must not yield them.
        for t in [&a, &b, &c] {
            if *t != first {
                t.cell().mark_dead();
            }
        }
        assert!(shuf.next().is_none());
    }

    #[test]
    fn test_count_ignores_dead() {
        let a = turtle(0);
        let set = AgentSet::from_refs(AgentKind::Turtle, vec![a.clone(), turtle(1)]);
        assert_eq!(set.count(), 2);
        a.cell().mark_dead();
        assert_eq!(set.count(), 1);
    }
}
