// tracker.rs — Dependency tracker for one load
//
// Records, per decode unit, the names it is still waiting for, orders the
// next pass, and detects passes that made no progress. A unit is a whole
// block, or one attribute of a `locals` block.
//
// Preconditions: units are registered in declaration order.
// Postconditions: `next_order` lists every waiting unit exactly once.
// Failure modes: none; cycles fall back to declaration order.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::eval::Dependency;
use crate::id::BlockId;

/// Identity of one decode unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitKey {
    pub block: BlockId,
    /// Attribute index within a `locals` block.
    pub member: Option<u32>,
}

impl UnitKey {
    pub fn block(block: BlockId) -> Self {
        UnitKey {
            block,
            member: None,
        }
    }

    pub fn member(block: BlockId, member: u32) -> Self {
        UnitKey {
            block,
            member: Some(member),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitState {
    Waiting,
    Resolved,
    Abandoned,
}

#[derive(Debug, Default)]
pub struct DependencyTracker {
    /// Name each unit makes available, e.g. `query.q1`.
    provides: BTreeMap<UnitKey, String>,
    states: HashMap<UnitKey, UnitState>,
    deferrals: BTreeMap<UnitKey, Dependency>,
    pass: u32,
    resolved_in_pass: usize,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset everything tracked. Called once at the start of a load.
    pub fn clear(&mut self) {
        self.provides.clear();
        self.states.clear();
        self.deferrals.clear();
        self.pass = 0;
        self.resolved_in_pass = 0;
    }

    pub fn register(&mut self, key: UnitKey, provides: impl Into<String>) {
        self.provides.insert(key, provides.into());
        self.states.insert(key, UnitState::Waiting);
    }

    /// Start the next pass and return its number (1-based).
    pub fn begin_pass(&mut self) -> u32 {
        self.pass += 1;
        self.resolved_in_pass = 0;
        self.pass
    }

    pub fn pass(&self) -> u32 {
        self.pass
    }

    /// Replace any prior deferral recorded for `key`.
    pub fn record_deferral(&mut self, key: UnitKey, dependency: Dependency) {
        self.deferrals.insert(key, dependency);
    }

    pub fn mark_resolved(&mut self, key: UnitKey) {
        self.deferrals.remove(&key);
        if self.states.insert(key, UnitState::Resolved) == Some(UnitState::Waiting) {
            self.resolved_in_pass += 1;
        }
    }

    /// Drop a unit after a hard error; it is never retried.
    pub fn abandon(&mut self, key: UnitKey) {
        self.deferrals.remove(&key);
        self.states.insert(key, UnitState::Abandoned);
    }

    /// True iff at least one waiting unit resolved during the current pass.
    /// Before pass 2 nothing has been attempted, so every unit counts as
    /// previously pending.
    pub fn progressed(&self) -> bool {
        self.resolved_in_pass > 0
    }

    pub fn is_waiting(&self, key: UnitKey) -> bool {
        self.states.get(&key) == Some(&UnitState::Waiting)
    }

    /// Nothing left to attempt.
    pub fn is_done(&self) -> bool {
        !self.states.values().any(|s| *s == UnitState::Waiting)
    }

    /// Outstanding deferrals in declaration order.
    pub fn pending(&self) -> impl Iterator<Item = (UnitKey, &Dependency)> {
        self.deferrals.iter().map(|(k, d)| (*k, d))
    }

    pub fn pending_count(&self) -> usize {
        self.deferrals.len()
    }

    fn waiting(&self) -> Vec<UnitKey> {
        self.provides
            .keys()
            .copied()
            .filter(|k| self.is_waiting(*k))
            .collect()
    }

    /// The waiting unit that provides `name`, if any.
    fn provider_of(&self, name: &str, waiting: &BTreeSet<UnitKey>) -> Option<UnitKey> {
        waiting.iter().copied().find(|k| {
            self.provides
                .get(k)
                .is_some_and(|p| provides_name(p, name))
        })
    }

    /// Attempt order for the next pass.
    ///
    /// Edges come from recorded deferrals: a unit waits for the still
    /// waiting unit that provides a name it needs. Units are emitted in
    /// topological order; ties, units without known edges, and cycle
    /// members fall back to declaration order.
    pub fn next_order(&self) -> Vec<UnitKey> {
        let waiting = self.waiting();
        if self.deferrals.is_empty() {
            return waiting;
        }
        let waiting_set: BTreeSet<UnitKey> = waiting.iter().copied().collect();

        let mut in_degree: BTreeMap<UnitKey, u32> = waiting.iter().map(|k| (*k, 0)).collect();
        let mut adj: HashMap<UnitKey, BTreeSet<UnitKey>> = HashMap::new();
        for (&key, dep) in &self.deferrals {
            if !waiting_set.contains(&key) {
                continue;
            }
            for name in &dep.names {
                let Some(provider) = self.provider_of(name, &waiting_set) else {
                    continue;
                };
                if provider != key && adj.entry(provider).or_default().insert(key) {
                    *in_degree.entry(key).or_insert(0) += 1;
                }
            }
        }

        // Kahn's algorithm; the ready set is ordered by declaration.
        let mut ready: BTreeSet<UnitKey> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&k, _)| k)
            .collect();
        let mut order = Vec::with_capacity(waiting.len());
        let mut queue: VecDeque<UnitKey> = VecDeque::new();

        loop {
            while let Some(key) = ready.pop_first() {
                queue.push_back(key);
            }
            let Some(key) = queue.pop_front() else {
                break;
            };
            order.push(key);
            if let Some(next) = adj.get(&key) {
                for &n in next {
                    if let Some(deg) = in_degree.get_mut(&n) {
                        *deg -= 1;
                        if *deg == 0 {
                            ready.insert(n);
                        }
                    }
                }
            }
        }

        // Cycle members keep declaration order.
        if order.len() < waiting.len() {
            let placed: BTreeSet<UnitKey> = order.iter().copied().collect();
            order.extend(waiting.into_iter().filter(|k| !placed.contains(k)));
        }
        order
    }
}

/// `query.q1` provides `query.q1`, `query.q1.sql` and `mod.query.q1.sql`.
fn provides_name(provides: &str, name: &str) -> bool {
    let matches = |candidate: &str| {
        candidate == provides
            || candidate
                .strip_prefix(provides)
                .is_some_and(|rest| rest.starts_with('.'))
    };
    matches(name) || name.split_once('.').is_some_and(|(_, rest)| matches(rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FileId, SourceRange};

    fn key(i: u32) -> UnitKey {
        UnitKey::block(BlockId(i))
    }

    fn dep(names: &[&str]) -> Dependency {
        Dependency {
            names: names.iter().map(|s| s.to_string()).collect(),
            range: SourceRange::new(FileId(0), (0..1).into()),
            detail: String::new(),
        }
    }

    fn tracker(names: &[&str]) -> DependencyTracker {
        let mut t = DependencyTracker::new();
        for (i, name) in names.iter().enumerate() {
            t.register(key(i as u32), *name);
        }
        t
    }

    #[test]
    fn first_pass_uses_declaration_order() {
        let t = tracker(&["local.c", "local.b", "local.a"]);
        assert_eq!(t.next_order(), vec![key(0), key(1), key(2)]);
    }

    #[test]
    fn deferred_units_follow_their_providers() {
        // 0 needs 1, 1 needs 2; 2 resolved in pass 1.
        let mut t = tracker(&["local.c", "local.b", "local.a"]);
        t.begin_pass();
        t.record_deferral(key(0), dep(&["local.b"]));
        t.record_deferral(key(1), dep(&["local.a"]));
        t.mark_resolved(key(2));
        assert!(t.progressed());
        assert_eq!(t.next_order(), vec![key(1), key(0)]);
    }

    #[test]
    fn attribute_paths_match_provider() {
        let mut t = tracker(&["control.c", "query.q"]);
        t.begin_pass();
        t.record_deferral(key(0), dep(&["query.q.sql"]));
        t.record_deferral(key(1), dep(&["var.missing"]));
        assert_eq!(t.next_order(), vec![key(1), key(0)]);
    }

    #[test]
    fn mod_qualified_names_match() {
        assert!(provides_name("query.q1", "aws.query.q1.sql"));
        assert!(provides_name("query.q1", "query.q1"));
        assert!(!provides_name("query.q1", "query.q10"));
    }

    #[test]
    fn cycles_fall_back_to_declaration_order() {
        let mut t = tracker(&["local.a", "local.b", "local.c"]);
        t.begin_pass();
        t.record_deferral(key(0), dep(&["local.b"]));
        t.record_deferral(key(1), dep(&["local.a"]));
        t.mark_resolved(key(2));
        assert_eq!(t.next_order(), vec![key(0), key(1)]);
    }

    #[test]
    fn record_deferral_replaces_previous() {
        let mut t = tracker(&["local.a"]);
        t.record_deferral(key(0), dep(&["local.x"]));
        t.record_deferral(key(0), dep(&["local.y"]));
        assert_eq!(t.pending_count(), 1);
        assert_eq!(t.pending().next().unwrap().1.names, vec!["local.y"]);
    }

    #[test]
    fn no_progress_when_nothing_resolves() {
        let mut t = tracker(&["local.a", "local.b"]);
        t.begin_pass();
        t.record_deferral(key(0), dep(&["local.b"]));
        t.record_deferral(key(1), dep(&["local.a"]));
        assert!(!t.progressed());
        assert!(!t.is_done());
    }

    #[test]
    fn abandoned_units_are_done() {
        let mut t = tracker(&["local.a"]);
        t.begin_pass();
        t.record_deferral(key(0), dep(&["local.x"]));
        t.abandon(key(0));
        assert!(t.is_done());
        assert_eq!(t.pending_count(), 0);
        assert!(t.next_order().is_empty());
    }

    #[test]
    fn clear_resets() {
        let mut t = tracker(&["local.a"]);
        t.begin_pass();
        t.record_deferral(key(0), dep(&["local.x"]));
        t.clear();
        assert_eq!(t.pass(), 0);
        assert_eq!(t.pending_count(), 0);
        assert!(t.is_done());
    }
}
