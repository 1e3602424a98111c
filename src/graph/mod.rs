//! Per-environment dependency graph: cycle detection, weakly connected
//! components, and destructive root-first iteration.
//!
//! Nodes are configurations; an edge A → B means A must exist before B and
//! comes from a reference parameter in B pointing at A's coordinate
//! (including the reserved `scope` parameter). Reference targets outside
//! the environment's configuration set add no edge; they stay dangling
//! and fail at resolve time if actually needed.

use crate::error::Error;
use crate::project::{Configuration, Coordinate};
use std::collections::{HashMap, HashSet, VecDeque};

/// The dependency graph of one environment, split into independently
/// deployable components.
#[derive(Debug)]
pub struct EnvironmentGraph {
    pub components: Vec<Component>,
}

impl EnvironmentGraph {
    /// Builds the graph and proves it acyclic.
    ///
    /// # Errors
    ///
    /// Fails with a validation error naming the full cycle when the
    /// configurations reference each other circularly.
    pub fn build(environment: &str, configurations: Vec<Configuration>) -> Result<Self, Error> {
        let index_of: HashMap<Coordinate, usize> = configurations
            .iter()
            .enumerate()
            .map(|(i, c)| (c.coordinate.clone(), i))
            .collect();

        let n = configurations.len();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut seen_edges: HashSet<(usize, usize)> = HashSet::new();

        for (dependent, config) in configurations.iter().enumerate() {
            for reference in config.references() {
                let Some(&dependency) = index_of.get(&reference.target) else {
                    continue; // dangling reference, resolved (or not) later
                };
                if seen_edges.insert((dependency, dependent)) {
                    dependents[dependency].push(dependent);
                }
            }
        }

        detect_cycle(environment, &configurations, &dependents)?;

        let components = split_components(configurations, &dependents);
        Ok(Self { components })
    }

    /// Total number of configurations across all components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.iter().map(Component::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Kahn's algorithm; any leftover in-degree means a cycle, which is then
/// walked explicitly so the error lists the chain `[a, b, ..., a]`.
fn detect_cycle(
    environment: &str,
    configurations: &[Configuration],
    dependents: &[Vec<usize>],
) -> Result<(), Error> {
    let n = configurations.len();
    let mut in_degree = vec![0usize; n];
    for successors in dependents {
        for &succ in successors {
            in_degree[succ] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut visited = 0usize;

    while let Some(node) = queue.pop_front() {
        visited += 1;
        for &succ in &dependents[node] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                queue.push_back(succ);
            }
        }
    }

    if visited == n {
        return Ok(());
    }

    let stuck: Vec<usize> = (0..n).filter(|&i| in_degree[i] > 0).collect();
    let chain = cycle_chain(configurations, dependents, &stuck);
    Err(Error::config_cycle(environment, &chain))
}

fn cycle_chain(
    configurations: &[Configuration],
    dependents: &[Vec<usize>],
    stuck: &[usize],
) -> Vec<Coordinate> {
    let stuck_set: HashSet<usize> = stuck.iter().copied().collect();
    let start = stuck[0];
    let mut path = vec![start];
    let mut seen: HashSet<usize> = [start].into();
    let mut current = start;

    loop {
        let Some(next) = dependents[current]
            .iter()
            .copied()
            .find(|succ| stuck_set.contains(succ))
        else {
            break;
        };
        if seen.contains(&next) {
            let pos = path.iter().position(|&i| i == next).unwrap_or(0);
            let mut chain: Vec<Coordinate> = path[pos..]
                .iter()
                .map(|&i| configurations[i].coordinate.clone())
                .collect();
            chain.push(configurations[next].coordinate.clone());
            return chain;
        }
        seen.insert(next);
        path.push(next);
        current = next;
    }

    path.iter()
        .map(|&i| configurations[i].coordinate.clone())
        .collect()
}

/// Union-find over the undirected view; each set becomes one [`Component`].
fn split_components(
    configurations: Vec<Configuration>,
    dependents: &[Vec<usize>],
) -> Vec<Component> {
    let n = configurations.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for (from, successors) in dependents.iter().enumerate() {
        for &to in successors {
            let a = find(&mut parent, from);
            let b = find(&mut parent, to);
            if a != b {
                parent[a] = b;
            }
        }
    }

    // Group global indices by root, preserving declaration order
    let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
    let mut group_of_root: HashMap<usize, usize> = HashMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        let group = *group_of_root.entry(root).or_insert_with(|| {
            groups.push((root, Vec::new()));
            groups.len() - 1
        });
        groups[group].1.push(i);
    }

    let mut slots: Vec<Option<Configuration>> = configurations.into_iter().map(Some).collect();

    groups
        .into_iter()
        .map(|(_, members)| {
            let local_of: HashMap<usize, usize> =
                members.iter().enumerate().map(|(l, &g)| (g, l)).collect();

            let mut local_dependents: Vec<Vec<usize>> = vec![Vec::new(); members.len()];
            let mut in_degree = vec![0usize; members.len()];
            for (local, &global) in members.iter().enumerate() {
                for &succ in &dependents[global] {
                    let succ_local = local_of[&succ];
                    local_dependents[local].push(succ_local);
                    in_degree[succ_local] += 1;
                }
            }

            let configs: Vec<Option<Configuration>> = members
                .iter()
                .map(|&g| slots[g].take())
                .collect();
            let index_of = configs
                .iter()
                .enumerate()
                .filter_map(|(l, c)| c.as_ref().map(|c| (c.coordinate.clone(), l)))
                .collect();

            Component {
                index_of,
                slots: configs,
                dependents: local_dependents,
                in_degree,
                active: vec![true; members.len()],
                taken: vec![false; members.len()],
            }
        })
        .collect()
}

/// One weakly connected component, deployable independently of the others.
///
/// Iteration is destructive: [`Component::take_roots`] hands out the
/// current root configurations, and [`Component::complete`] /
/// [`Component::prune`] remove finished nodes so new roots appear.
#[derive(Debug)]
pub struct Component {
    index_of: HashMap<Coordinate, usize>,
    slots: Vec<Option<Configuration>>,
    dependents: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
    /// Still part of the graph (neither completed nor pruned).
    active: Vec<bool>,
    /// Handed out as a root and not yet completed or pruned.
    taken: Vec<bool>,
}

impl Component {
    /// Nodes still in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns every current root: an active, not-yet-taken
    /// node whose remaining in-edges are all gone.
    pub fn take_roots(&mut self) -> Vec<Configuration> {
        let root_indices: Vec<usize> = (0..self.slots.len())
            .filter(|&i| self.active[i] && !self.taken[i] && self.in_degree[i] == 0)
            .collect();

        root_indices
            .into_iter()
            .filter_map(|i| {
                self.taken[i] = true;
                self.slots[i].take()
            })
            .collect()
    }

    /// Marks a taken node successfully finished, unblocking its dependents.
    pub fn complete(&mut self, coordinate: &Coordinate) {
        let Some(&index) = self.index_of.get(coordinate) else {
            return;
        };
        if !self.active[index] {
            return;
        }
        self.active[index] = false;
        self.taken[index] = false;
        for &succ in &self.dependents[index] {
            if self.active[succ] && self.in_degree[succ] > 0 {
                self.in_degree[succ] -= 1;
            }
        }
    }

    /// Removes a node and its transitive dependents without deploying them.
    /// Returns the pruned descendant configurations for skip reporting (the
    /// node itself, already taken by the caller, is not among them).
    pub fn prune(&mut self, coordinate: &Coordinate) -> Vec<Configuration> {
        let Some(&index) = self.index_of.get(coordinate) else {
            return Vec::new();
        };

        let mut pruned = Vec::new();
        let mut queue = VecDeque::from([index]);
        let mut enqueued: HashSet<usize> = [index].into();

        while let Some(node) = queue.pop_front() {
            if self.active[node] {
                self.active[node] = false;
                self.taken[node] = false;
                if let Some(config) = self.slots[node].take() {
                    pruned.push(config);
                }
            }
            for &succ in &self.dependents[node] {
                if enqueued.insert(succ) {
                    queue.push_back(succ);
                }
            }
        }

        pruned
    }

    /// Coordinates still in the graph, in declaration order.
    #[must_use]
    pub fn remaining(&self) -> Vec<Coordinate> {
        let mut coords: Vec<(usize, Coordinate)> = self
            .index_of
            .iter()
            .filter(|(_, &i)| self.active[i])
            .map(|(c, &i)| (i, c.clone()))
            .collect();
        coords.sort_by_key(|(i, _)| *i);
        coords.into_iter().map(|(_, c)| c).collect()
    }
}
