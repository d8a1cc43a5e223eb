use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

use diligence_core::models::AgentType;

pub type DependencyMap = BTreeMap<AgentType, BTreeSet<AgentType>>;

/// Random acyclic dependency maps over every agent type.
///
/// Agent types are shuffled into a topological order and each may depend on any
/// subset of the ones before it.
pub fn acyclic_dependency_strategy() -> impl Strategy<Value = DependencyMap> {
    let pairs = AgentType::ALL.len() * (AgentType::ALL.len() - 1) / 2;
    (
        Just(AgentType::ALL.to_vec()).prop_shuffle(),
        prop::collection::vec(any::<bool>(), pairs),
    )
        .prop_map(|(order, edges)| {
            let mut edge_bits = edges.into_iter();
            let mut map = DependencyMap::new();
            for (index, agent_type) in order.iter().enumerate() {
                let dependencies = order[..index]
                    .iter()
                    .filter(|_| edge_bits.next().unwrap_or(false))
                    .copied()
                    .collect();
                map.insert(*agent_type, dependencies);
            }
            map
        })
}

/// Acyclic maps with one extra back edge that closes a cycle
pub fn cyclic_dependency_strategy() -> impl Strategy<Value = DependencyMap> {
    (
        Just(AgentType::ALL.to_vec()).prop_shuffle(),
        acyclic_dependency_strategy(),
    )
        .prop_map(|(order, mut map)| {
            let first = order[0];
            let last = order[order.len() - 1];
            map.entry(first).or_default().insert(last);
            map.entry(last).or_default().insert(first);
            map
        })
}

/// Expected durations, one per agent type in canonical order
pub fn durations_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.25f64..12.0, AgentType::ALL.len())
}
