//! Dependency graph over resource descriptors.
//!
//! Descriptors are collected as pure data, validated as a DAG, then sorted so
//! that every descriptor comes after everything it depends on. Nothing live is
//! constructed here; provisioning happens afterwards in that order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::descriptor::ResourceDescriptor;
use crate::error::{Error, Result};
use crate::id::DescriptorId;

/// The descriptor set of one deployment unit.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    descriptors: BTreeMap<DescriptorId, ResourceDescriptor>,
    validated: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    OnStack,
    Done,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a descriptor list, failing on the first duplicate id.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = ResourceDescriptor>,
    ) -> Result<Self> {
        let mut graph = Self::new();
        for d in descriptors {
            graph.add_descriptor(d)?;
        }
        Ok(graph)
    }

    /// Add a descriptor. Adding invalidates any previous validation.
    pub fn add_descriptor(&mut self, descriptor: ResourceDescriptor) -> Result<()> {
        if self.descriptors.contains_key(&descriptor.id) {
            return Err(Error::DuplicateId { id: descriptor.id });
        }
        self.validated = false;
        self.descriptors.insert(descriptor.id.clone(), descriptor);
        Ok(())
    }

    pub fn get(&self, id: &DescriptorId) -> Option<&ResourceDescriptor> {
        self.descriptors.get(id)
    }

    /// Descriptors in ascending id order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    /// Check every edge targets a known descriptor and that the edges form a DAG.
    pub fn validate(&mut self) -> Result<()> {
        self.validated = false;

        for d in self.descriptors.values() {
            for dep in &d.depends_on {
                if !self.descriptors.contains_key(dep) {
                    return Err(Error::UnknownDependency {
                        descriptor: d.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut state: HashMap<&DescriptorId, Visit> = HashMap::new();
        let mut stack: Vec<&DescriptorId> = Vec::new();
        for id in self.descriptors.keys() {
            if !state.contains_key(id) {
                if let Some(path) = self.find_cycle(id, &mut state, &mut stack) {
                    return Err(Error::CyclicDependency { path });
                }
            }
        }

        self.validated = true;
        Ok(())
    }

    /// DFS from `id`; returns the cycle path on a back edge.
    fn find_cycle<'a>(
        &'a self,
        id: &'a DescriptorId,
        state: &mut HashMap<&'a DescriptorId, Visit>,
        stack: &mut Vec<&'a DescriptorId>,
    ) -> Option<Vec<DescriptorId>> {
        state.insert(id, Visit::OnStack);
        stack.push(id);

        if let Some(d) = self.descriptors.get(id) {
            for dep in &d.depends_on {
                match state.get(dep).copied() {
                    Some(Visit::OnStack) => {
                        let start = stack.iter().position(|s| *s == dep).unwrap_or(0);
                        let mut path: Vec<DescriptorId> =
                            stack[start..].iter().map(|s| (*s).clone()).collect();
                        path.push(dep.clone());
                        return Some(path);
                    }
                    Some(Visit::Done) => {}
                    None => {
                        if let Some(path) = self.find_cycle(dep, state, stack) {
                            return Some(path);
                        }
                    }
                }
            }
        }

        stack.pop();
        state.insert(id, Visit::Done);
        None
    }

    /// Dependencies-first order; independent descriptors come out by ascending id.
    pub fn topological_order(&self) -> Result<Vec<&ResourceDescriptor>> {
        if !self.validated {
            return Err(Error::GraphNotValidated);
        }

        let (mut remaining, dependents) = self.in_degrees();
        let mut ready: BTreeSet<&DescriptorId> = remaining
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(self.descriptors.len());
        while let Some(id) = ready.pop_first() {
            order.push(&self.descriptors[id]);
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(n) = remaining.get_mut(dependent) {
                    *n -= 1;
                    if *n == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        Ok(order)
    }

    /// Groups of descriptors whose dependencies are all satisfied by earlier groups.
    /// Members of one wave are independent of each other; each wave is sorted by id.
    pub fn provisioning_waves(&self) -> Result<Vec<Vec<&ResourceDescriptor>>> {
        if !self.validated {
            return Err(Error::GraphNotValidated);
        }

        let (mut remaining, dependents) = self.in_degrees();
        let mut current: Vec<&DescriptorId> = remaining
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut waves = Vec::new();
        while !current.is_empty() {
            let mut next = BTreeSet::new();
            for id in &current {
                for dependent in dependents.get(*id).into_iter().flatten() {
                    if let Some(n) = remaining.get_mut(dependent) {
                        *n -= 1;
                        if *n == 0 {
                            next.insert(*dependent);
                        }
                    }
                }
            }
            waves.push(current.iter().map(|id| &self.descriptors[*id]).collect());
            current = next.into_iter().collect();
        }

        Ok(waves)
    }

    /// Unsatisfied dependency counts, and the reverse edges (dependency -> dependents).
    fn in_degrees(
        &self,
    ) -> (
        BTreeMap<&DescriptorId, usize>,
        HashMap<&DescriptorId, Vec<&DescriptorId>>,
    ) {
        let mut remaining = BTreeMap::new();
        let mut dependents: HashMap<&DescriptorId, Vec<&DescriptorId>> = HashMap::new();
        for d in self.descriptors.values() {
            remaining.insert(&d.id, d.depends_on.len());
            for dep in &d.depends_on {
                dependents.entry(dep).or_default().push(&d.id);
            }
        }
        (remaining, dependents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ResourceKind;

    fn node(id: &str, deps: &[&str]) -> ResourceDescriptor {
        deps.iter().fold(
            ResourceDescriptor::new(id, ResourceKind::Service),
            |d, dep| d.depends_on(*dep),
        )
    }

    fn ids(order: &[&ResourceDescriptor]) -> Vec<String> {
        order.iter().map(|d| d.id.to_string()).collect()
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut graph = DependencyGraph::new();
        graph.add_descriptor(node("repo1", &[])).unwrap();
        let err = graph.add_descriptor(node("repo1", &[])).unwrap_err();
        assert!(matches!(err, Error::DuplicateId { id } if id == "repo1"));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let mut graph = DependencyGraph::from_descriptors([node("svc1", &["repo1"])]).unwrap();
        let err = graph.validate().unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownDependency { descriptor, dependency }
                if descriptor == "svc1" && dependency == "repo1"
        ));
        assert!(!graph.is_validated());
    }

    #[test]
    fn test_two_node_cycle_reports_path() {
        let mut graph =
            DependencyGraph::from_descriptors([node("a", &["b"]), node("b", &["a"])]).unwrap();
        match graph.validate().unwrap_err() {
            Error::CyclicDependency { path } => assert_eq!(path, vec!["a", "b", "a"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let mut graph = DependencyGraph::from_descriptors([node("a", &["a"])]).unwrap();
        match graph.validate().unwrap_err() {
            Error::CyclicDependency { path } => assert_eq!(path, vec!["a", "a"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_path_excludes_acyclic_prefix() {
        // entry -> x -> y -> z -> x
        let mut graph = DependencyGraph::from_descriptors([
            node("entry", &["x"]),
            node("x", &["y"]),
            node("y", &["z"]),
            node("z", &["x"]),
        ])
        .unwrap();
        match graph.validate().unwrap_err() {
            Error::CyclicDependency { path } => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
                assert!(!path.iter().any(|id| id == "entry"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_order_requires_validation() {
        let graph = DependencyGraph::from_descriptors([node("a", &[])]).unwrap();
        assert!(matches!(
            graph.topological_order(),
            Err(Error::GraphNotValidated)
        ));
        assert!(matches!(
            graph.provisioning_waves(),
            Err(Error::GraphNotValidated)
        ));
    }

    #[test]
    fn test_adding_after_validation_requires_revalidation() {
        let mut graph = DependencyGraph::from_descriptors([node("a", &[])]).unwrap();
        graph.validate().unwrap();
        graph.add_descriptor(node("b", &["a"])).unwrap();
        assert!(matches!(
            graph.topological_order(),
            Err(Error::GraphNotValidated)
        ));
    }

    #[test]
    fn test_order_respects_dependencies() {
        let mut graph = DependencyGraph::from_descriptors([
            node("pipe", &["svc", "repo", "build"]),
            node("svc", &["repo"]),
            node("build", &["repo"]),
            node("repo", &[]),
        ])
        .unwrap();
        graph.validate().unwrap();
        let order = graph.topological_order().unwrap();

        let index: HashMap<&DescriptorId, usize> =
            order.iter().enumerate().map(|(i, d)| (&d.id, i)).collect();
        for d in &order {
            for dep in &d.depends_on {
                assert!(index[dep] < index[&d.id], "{dep} must precede {}", d.id);
            }
        }
        assert_eq!(ids(&order), vec!["repo", "build", "svc", "pipe"]);
    }

    #[test]
    fn test_ties_break_by_ascending_id_and_are_stable() {
        let mut graph = DependencyGraph::from_descriptors([
            node("zeta", &[]),
            node("alpha", &[]),
            node("mid", &["zeta"]),
            node("beta", &[]),
        ])
        .unwrap();
        graph.validate().unwrap();
        let first = ids(&graph.topological_order().unwrap());
        let second = ids(&graph.topological_order().unwrap());
        assert_eq!(first, vec!["alpha", "beta", "zeta", "mid"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_waves_group_independent_descriptors() {
        let mut graph = DependencyGraph::from_descriptors([
            node("repo", &[]),
            node("svc", &["repo"]),
            node("build", &["repo"]),
            node("pipe", &["svc", "build"]),
        ])
        .unwrap();
        graph.validate().unwrap();
        let waves: Vec<Vec<String>> = graph
            .provisioning_waves()
            .unwrap()
            .iter()
            .map(|w| ids(w))
            .collect();
        assert_eq!(
            waves,
            vec![
                vec!["repo".to_string()],
                vec!["build".to_string(), "svc".to_string()],
                vec!["pipe".to_string()],
            ]
        );
    }

    #[test]
    fn test_empty_graph_sorts_to_nothing() {
        let mut graph = DependencyGraph::new();
        graph.validate().unwrap();
        assert!(graph.topological_order().unwrap().is_empty());
        assert!(graph.provisioning_waves().unwrap().is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn id(i: usize) -> String {
            format!("n{i:02}")
        }

        /// Node `i` depends on `j` when `j < i` and `edges[i][j]` is set.
        fn lower_index_graph(edges: &[Vec<bool>]) -> DependencyGraph {
            let descriptors = edges.iter().enumerate().map(|(i, row)| {
                row.iter()
                    .take(i)
                    .enumerate()
                    .filter(|(_, set)| **set)
                    .fold(ResourceDescriptor::new(id(i), ResourceKind::Service), |d, (j, _)| {
                        d.depends_on(id(j))
                    })
            });
            DependencyGraph::from_descriptors(descriptors).unwrap()
        }

        fn adjacency(max_nodes: usize) -> impl Strategy<Value = Vec<Vec<bool>>> {
            (1..=max_nodes).prop_flat_map(|n| {
                proptest::collection::vec(proptest::collection::vec(any::<bool>(), n), n)
            })
        }

        proptest! {
            /// Every descriptor comes after all of its dependencies, and the order is stable.
            #[test]
            fn acyclic_graphs_sort_dependencies_first(edges in adjacency(12)) {
                let mut graph = lower_index_graph(&edges);
                prop_assert!(graph.validate().is_ok());

                let order = graph.topological_order().unwrap();
                prop_assert_eq!(order.len(), edges.len());
                let position: HashMap<&DescriptorId, usize> =
                    order.iter().enumerate().map(|(pos, d)| (&d.id, pos)).collect();
                for d in &order {
                    for dep in &d.depends_on {
                        prop_assert!(position[dep] < position[&d.id]);
                    }
                }

                let again = graph.topological_order().unwrap();
                prop_assert_eq!(ids(&order), ids(&again));
            }

            /// A back edge over a dependency chain is reported as a closed path of real edges.
            #[test]
            fn back_edges_report_closed_cycle(
                (edges, lo, hi) in adjacency(12).prop_flat_map(|edges| {
                    let n = edges.len();
                    (Just(edges), 0..n).prop_flat_map(move |(edges, lo)| (Just(edges), Just(lo), lo..n))
                })
            ) {
                let mut graph = lower_index_graph(&edges);
                for i in 1..edges.len() {
                    if let Some(d) = graph.descriptors.get_mut(&DescriptorId::new(id(i))) {
                        d.depends_on.insert(DescriptorId::new(id(i - 1)));
                    }
                }
                if let Some(d) = graph.descriptors.get_mut(&DescriptorId::new(id(lo))) {
                    d.depends_on.insert(DescriptorId::new(id(hi)));
                }

                let Err(Error::CyclicDependency { path }) = graph.validate() else {
                    return Err(TestCaseError::fail("expected a cyclic dependency"));
                };
                prop_assert!(path.len() >= 2);
                prop_assert_eq!(path.first(), path.last());
                for pair in path.windows(2) {
                    let from = graph.get(&pair[0]).unwrap();
                    prop_assert!(from.depends_on.contains(&pair[1]));
                }
                prop_assert!(!graph.is_validated());
            }
        }
    }
}

