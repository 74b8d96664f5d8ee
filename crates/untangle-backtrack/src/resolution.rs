use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{Criterion, Provider, State};

/// The outcome of a successful resolution.
#[derive(Debug, Clone)]
pub struct Resolution<I, R, C> {
    /// The pinned candidate of every identifier reachable from the root requirements, in pin
    /// order.
    pub mapping: IndexMap<I, C>,
    /// Edges from the identifier of a pinned candidate to the identifiers it requires. The
    /// `None` node is the root; it points at the identifiers of the root requirements.
    pub graph: DiGraph<Option<I>, ()>,
    /// The final criteria, including identifiers that are no longer reachable.
    pub criteria: IndexMap<I, Criterion<R, C>>,
}

impl<I, R, C> Resolution<I, R, C> {
    /// Every edge of the graph as `(parent, child)`, with `None` for the root.
    pub fn edges(&self) -> impl Iterator<Item = (Option<&I>, &I)> {
        self.graph.raw_edges().iter().filter_map(|edge| {
            let child = self.graph[edge.target()].as_ref()?;
            Some((self.graph[edge.source()].as_ref(), child))
        })
    }
}

impl<I: Clone + Eq + std::hash::Hash, R, C: PartialEq> Resolution<I, R, C> {
    /// Keep the pins that can be reached from the root through requirements of pinned
    /// candidates and connect them into a graph.
    pub(crate) fn from_state<P>(provider: &P, state: State<I, R, C>) -> Self
    where
        P: Provider<Identifier = I, Requirement = R, Candidate = C>,
    {
        let State {
            mapping, criteria, ..
        } = state;

        // The identifier of a parent, if it's still the pinned candidate of that identifier.
        let parent_key = |parent: &C| -> Option<I> {
            let key = provider.identify_candidate(parent);
            (mapping.get(&key) == Some(parent)).then_some(key)
        };

        let mut graph = DiGraph::new();
        let mut nodes: FxHashMap<Option<I>, NodeIndex> = FxHashMap::default();
        nodes.insert(None, graph.add_node(None));
        let mut connected = FxHashSet::default();

        for (key, criterion) in &criteria {
            let mut visiting = FxHashSet::default();
            if !has_route_to_root(&criteria, key, &parent_key, &mut connected, &mut visiting) {
                continue;
            }
            let node = *nodes
                .entry(Some(key.clone()))
                .or_insert_with(|| graph.add_node(Some(key.clone())));
            for parent in criterion.iter_parent() {
                let parent = match parent {
                    None => None,
                    Some(parent) => match parent_key(parent) {
                        Some(parent) => Some(parent),
                        None => continue,
                    },
                };
                let parent_node = *nodes
                    .entry(parent.clone())
                    .or_insert_with(|| graph.add_node(parent));
                graph.update_edge(parent_node, node, ());
            }
        }

        let mapping = mapping
            .into_iter()
            .filter(|(key, _)| connected.contains(key))
            .collect();

        Self {
            mapping,
            graph,
            criteria,
        }
    }
}

/// Whether any requirement on `key` traces back to a root requirement through pinned
/// candidates. Memoizes positive answers in `connected`.
fn has_route_to_root<I, R, C>(
    criteria: &IndexMap<I, Criterion<R, C>>,
    key: &I,
    parent_key: &impl Fn(&C) -> Option<I>,
    connected: &mut FxHashSet<I>,
    visiting: &mut FxHashSet<I>,
) -> bool
where
    I: Clone + Eq + std::hash::Hash,
{
    if connected.contains(key) {
        return true;
    }
    let Some(criterion) = criteria.get(key) else {
        return false;
    };
    // Dependency cycles
    if !visiting.insert(key.clone()) {
        return false;
    }
    for parent in criterion.iter_parent() {
        let Some(parent) = parent else {
            connected.insert(key.clone());
            return true;
        };
        let Some(parent) = parent_key(parent) else {
            continue;
        };
        if connected.contains(&parent)
            || has_route_to_root(criteria, &parent, parent_key, connected, visiting)
        {
            connected.insert(key.clone());
            return true;
        }
    }
    false
}
