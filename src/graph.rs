//! # Dependency graph over service specs.
//!
//! [`DependencyGraph::build`] validates the `depends_on` edges and computes a
//! deterministic start order with Kahn's algorithm.
//!
//! ## Rules
//! - Names are unique; every dependency must be declared ([`GraphError::UnknownDependency`]).
//! - Among services that are ready at the same time, the one declared first starts first.
//! - A cycle is reported with the services on one concrete cycle, in edge order.
//! - [`DependencyGraph::shutdown_order`] is the exact reverse of [`DependencyGraph::start_order`].
//! - The graph is immutable and shared via `Arc` between the supervisor and monitors.
//!
//! ```text
//!   execution ◄── beacon ◄── metrics
//!       ▲                      │
//!       └──────────────────────┘
//!
//!   start:    execution, beacon, metrics
//!   shutdown: metrics, beacon, execution
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::GraphError;
use crate::services::ServiceSpec;

/// Validated dependency graph with a precomputed topological order.
#[derive(Debug)]
pub struct DependencyGraph {
    specs: Vec<Arc<ServiceSpec>>,
    index: HashMap<String, usize>,
    dependents: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl DependencyGraph {
    /// Builds the graph from specs in declaration order.
    ///
    /// # Errors
    /// [`GraphError::DuplicateService`], [`GraphError::UnknownDependency`] (first
    /// offender in declaration order), or [`GraphError::Cycle`].
    pub fn build(specs: impl IntoIterator<Item = ServiceSpec>) -> Result<Self, GraphError> {
        let specs: Vec<Arc<ServiceSpec>> = specs.into_iter().map(Arc::new).collect();

        let mut index = HashMap::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            if index.insert(spec.name().to_owned(), i).is_some() {
                return Err(GraphError::DuplicateService {
                    name: spec.name().to_owned(),
                });
            }
        }

        let mut dependents = vec![Vec::new(); specs.len()];
        let mut indegree = vec![0usize; specs.len()];
        for (i, spec) in specs.iter().enumerate() {
            for dep in spec.depends_on() {
                let Some(&d) = index.get(dep) else {
                    return Err(GraphError::UnknownDependency {
                        service: spec.name().to_owned(),
                        missing: dep.clone(),
                    });
                };
                dependents[d].push(i);
                indegree[i] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..specs.len()).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(specs.len());
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &n in &dependents[i] {
                indegree[n] -= 1;
                if indegree[n] == 0 {
                    ready.insert(n);
                }
            }
        }

        if order.len() < specs.len() {
            let participants = find_cycle(&specs, &index, &indegree);
            return Err(GraphError::Cycle { participants });
        }

        Ok(Self {
            specs,
            index,
            dependents,
            order,
        })
    }

    /// Topological order: every service appears after all of its dependencies.
    pub fn start_order(&self) -> impl DoubleEndedIterator<Item = &str> + ExactSizeIterator + '_ {
        self.order.iter().map(|&i| self.specs[i].name())
    }

    /// Exact reverse of [`start_order`](Self::start_order).
    pub fn shutdown_order(&self) -> impl Iterator<Item = &str> + '_ {
        self.start_order().rev()
    }

    /// Specs in start order.
    pub fn specs_in_start_order(&self) -> impl Iterator<Item = &Arc<ServiceSpec>> + '_ {
        self.order.iter().map(|&i| &self.specs[i])
    }

    /// Looks up a spec by name.
    pub fn spec(&self, name: &str) -> Option<&Arc<ServiceSpec>> {
        self.index.get(name).map(|&i| &self.specs[i])
    }

    /// Direct dependencies of `name` (empty if unknown).
    pub fn dependencies(&self, name: &str) -> &[String] {
        self.spec(name).map(|s| s.depends_on()).unwrap_or(&[])
    }

    /// Services that directly depend on `name`, in declaration order.
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        match self.index.get(name) {
            Some(&i) => self.dependents[i]
                .iter()
                .map(|&d| self.specs[d].name())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Every service that depends on `name` directly or indirectly, in start order.
    pub fn transitive_dependents(&self, name: &str) -> Vec<&str> {
        let Some(&root) = self.index.get(name) else {
            return Vec::new();
        };
        let mut seen = vec![false; self.specs.len()];
        let mut stack = vec![root];
        while let Some(i) = stack.pop() {
            for &d in &self.dependents[i] {
                if !seen[d] {
                    seen[d] = true;
                    stack.push(d);
                }
            }
        }
        self.order
            .iter()
            .filter(|&&i| seen[i])
            .map(|&i| self.specs[i].name())
            .collect()
    }

    /// True if some service depends on `name`.
    pub fn has_dependents(&self, name: &str) -> bool {
        self.index
            .get(name)
            .is_some_and(|&i| !self.dependents[i].is_empty())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Walks dependency edges among the nodes Kahn could not emit until a node repeats.
///
/// Every leftover node has at least one leftover dependency, so the walk always closes.
fn find_cycle(
    specs: &[Arc<ServiceSpec>],
    index: &HashMap<String, usize>,
    indegree: &[usize],
) -> Vec<String> {
    let Some(start) = (0..specs.len()).find(|&i| indegree[i] > 0) else {
        return Vec::new();
    };

    let mut path: Vec<usize> = Vec::new();
    let mut position: HashMap<usize, usize> = HashMap::new();
    let mut current = start;

    loop {
        if let Some(&at) = position.get(&current) {
            return path[at..]
                .iter()
                .map(|&i| specs[i].name().to_owned())
                .collect();
        }
        position.insert(current, path.len());
        path.push(current);

        let next = specs[current]
            .depends_on()
            .iter()
            .filter_map(|d| index.get(d).copied())
            .find(|&d| indegree[d] > 0);
        match next {
            Some(n) => current = n,
            None => return path.iter().map(|&i| specs[i].name().to_owned()).collect(),
        }
    }
}
