//! Directed dependency graph over service names (`spec.md` §4.2).
//!
//! Edge direction convention: `dependency -> dependent`. Adding "B depends
//! on A" (`add_dependency("B", "A")`) inserts the edge `A -> B`, so a
//! [`topological_order`](DependencyGraph::topological_order) walk visits
//! dependencies before their dependents.
//!
//! Concurrent readers are supported: all mutation goes through
//! [`std::sync::RwLock`], and every query method returns owned data rather
//! than references into internal storage (`spec.md` §5).

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::RwLock;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
  #[error("service name must not be empty")]
  EmptyServiceName,
  #[error("service {0:?} cannot depend on itself")]
  SelfDependency(String),
  #[error("unknown dependent service {0:?}")]
  UnknownDependent(String),
  #[error("unknown dependency service {0:?}")]
  UnknownDependency(String),
  #[error("unknown service {0:?}")]
  UnknownService(String),
  #[error("dependency graph contains a cycle")]
  Cycle,
}

#[derive(Default)]
struct Inner {
  /// node -> services that depend on it (edges out of `node`)
  successors: HashMap<String, BTreeSet<String>>,
  /// node -> services it depends on (edges into `node`)
  predecessors: HashMap<String, BTreeSet<String>>,
}

/// Directed dependency graph over service names.
pub struct DependencyGraph {
  inner: RwLock<Inner>,
}

impl Default for DependencyGraph {
  fn default() -> Self {
    Self::new()
  }
}

impl DependencyGraph {
  pub fn new() -> Self {
    DependencyGraph {
      inner: RwLock::new(Inner::default()),
    }
  }

  /// Idempotent: adding an already-known service is a no-op.
  pub fn add_service(&self, name: &str) {
    let mut inner = self.inner.write().unwrap();
    inner.successors.entry(name.to_string()).or_default();
    inner.predecessors.entry(name.to_string()).or_default();
  }

  /// Records that `dependent` depends on `dep` (edge `dep -> dependent`).
  /// Both endpoints are created if missing. Idempotent on an existing edge.
  pub fn add_dependency(
    &self,
    dependent: &str,
    dep: &str,
  ) -> Result<(), GraphError> {
    if dependent.is_empty() || dep.is_empty() {
      return Err(GraphError::EmptyServiceName);
    }
    if dependent == dep {
      return Err(GraphError::SelfDependency(dependent.to_string()));
    }
    let mut inner = self.inner.write().unwrap();
    inner.successors.entry(dep.to_string()).or_default();
    inner.predecessors.entry(dep.to_string()).or_default();
    inner.successors.entry(dependent.to_string()).or_default();
    inner.predecessors.entry(dependent.to_string()).or_default();

    inner
      .successors
      .get_mut(dep)
      .unwrap()
      .insert(dependent.to_string());
    inner
      .predecessors
      .get_mut(dependent)
      .unwrap()
      .insert(dep.to_string());
    Ok(())
  }

  fn exists(inner: &Inner, name: &str) -> bool {
    inner.successors.contains_key(name)
  }

  /// Direct dependencies of `s`, sorted.
  pub fn dependencies(&self, s: &str) -> Result<Vec<String>, GraphError> {
    let inner = self.inner.read().unwrap();
    let preds = inner
      .predecessors
      .get(s)
      .ok_or_else(|| GraphError::UnknownService(s.to_string()))?;
    Ok(preds.iter().cloned().collect())
  }

  /// Direct dependents of `s`, sorted.
  pub fn dependents(&self, s: &str) -> Result<Vec<String>, GraphError> {
    let inner = self.inner.read().unwrap();
    let succs = inner
      .successors
      .get(s)
      .ok_or_else(|| GraphError::UnknownService(s.to_string()))?;
    Ok(succs.iter().cloned().collect())
  }

  /// BFS closure of all transitive dependencies of `s`, sorted, excluding
  /// `s` itself.
  pub fn transitive_dependencies(
    &self,
    s: &str,
  ) -> Result<Vec<String>, GraphError> {
    self.transitive_closure(s, Direction::Predecessors)
  }

  /// BFS closure of all transitive dependents of `s`, sorted, excluding
  /// `s` itself.
  pub fn transitive_dependents(
    &self,
    s: &str,
  ) -> Result<Vec<String>, GraphError> {
    self.transitive_closure(s, Direction::Successors)
  }

  fn transitive_closure(
    &self,
    s: &str,
    dir: Direction,
  ) -> Result<Vec<String>, GraphError> {
    let inner = self.inner.read().unwrap();
    if !Self::exists(&inner, s) {
      return Err(GraphError::UnknownService(s.to_string()));
    }
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(s.to_string());
    seen.insert(s.to_string());
    let mut out = BTreeSet::new();
    while let Some(node) = queue.pop_front() {
      let neighbors = match dir {
        Direction::Successors => inner.successors.get(&node),
        Direction::Predecessors => inner.predecessors.get(&node),
      };
      for next in neighbors.into_iter().flatten() {
        if seen.insert(next.clone()) {
          out.insert(next.clone());
          queue.push_back(next.clone());
        }
      }
    }
    Ok(out.into_iter().collect())
  }

  /// Kahn's algorithm with lexical tie-break: at every step, the smallest
  /// zero-in-degree (no remaining unresolved dependency) node is emitted.
  /// Dependencies are ordered before their dependents.
  pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
    let inner = self.inner.read().unwrap();
    let mut in_degree: HashMap<&str, usize> = inner
      .predecessors
      .iter()
      .map(|(k, v)| (k.as_str(), v.len()))
      .collect();

    let mut ready: BTreeSet<&str> = in_degree
      .iter()
      .filter(|(_, &deg)| deg == 0)
      .map(|(k, _)| *k)
      .collect();

    let mut order = Vec::with_capacity(in_degree.len());
    while let Some(&node) = ready.iter().next() {
      ready.remove(node);
      order.push(node.to_string());
      for dependent in inner.successors.get(node).into_iter().flatten() {
        let deg = in_degree.get_mut(dependent.as_str()).unwrap();
        *deg -= 1;
        if *deg == 0 {
          ready.insert(dependent.as_str());
        }
      }
    }

    if order.len() == in_degree.len() {
      Ok(order)
    } else {
      Err(GraphError::Cycle)
    }
  }

  /// DFS-based cycle finder. Returns a path `[v0, v1, ..., vk, v0]` where
  /// consecutive elements are edges, or `None` if the graph is acyclic.
  pub fn find_cycle(&self) -> Option<Vec<String>> {
    let inner = self.inner.read().unwrap();
    #[derive(Clone, Copy, PartialEq)]
    enum State {
      Visiting,
      Done,
    }
    let mut state: HashMap<&str, State> = HashMap::new();
    let mut stack: Vec<&str> = Vec::new();

    let mut nodes: Vec<&str> =
      inner.successors.keys().map(String::as_str).collect();
    nodes.sort_unstable();

    for start in nodes {
      if state.contains_key(start) {
        continue;
      }
      if let Some(cycle) =
        Self::dfs(&inner, start, &mut state, &mut stack)
      {
        return Some(cycle);
      }
    }
    None
  }

  fn dfs<'a>(
    inner: &'a Inner,
    node: &'a str,
    state: &mut HashMap<&'a str, DfsState>,
    stack: &mut Vec<&'a str>,
  ) -> Option<Vec<String>> {
    state.insert(node, DfsState::Visiting);
    stack.push(node);

    if let Some(successors) = inner.successors.get(node) {
      for next in successors {
        match state.get(next.as_str()) {
          Some(DfsState::Visiting) => {
            let start = stack.iter().position(|n| *n == next.as_str())?;
            let mut cycle: Vec<String> =
              stack[start..].iter().map(|s| s.to_string()).collect();
            cycle.push(next.clone());
            return Some(cycle);
          }
          Some(DfsState::Done) => continue,
          None => {
            if let Some(cycle) =
              Self::dfs(inner, next.as_str(), state, stack)
            {
              return Some(cycle);
            }
          }
        }
      }
    }

    stack.pop();
    state.insert(node, DfsState::Done);
    None
  }

  /// Returns `Ok(true)` iff the edge `dep -> dependent` already exists, or
  /// adding it would not create a cycle (checked by probing whether `dep`
  /// is already reachable from `dependent` by following existing
  /// dependent edges forward).
  pub fn can_add_dependency(
    &self,
    dependent: &str,
    dep: &str,
  ) -> Result<bool, GraphError> {
    if dependent == dep {
      return Err(GraphError::SelfDependency(dependent.to_string()));
    }
    let inner = self.inner.read().unwrap();
    if !Self::exists(&inner, dependent) {
      return Err(GraphError::UnknownDependent(dependent.to_string()));
    }
    if !Self::exists(&inner, dep) {
      return Err(GraphError::UnknownDependency(dep.to_string()));
    }
    if inner
      .successors
      .get(dep)
      .is_some_and(|s| s.contains(dependent))
    {
      return Ok(true);
    }
    // Adding dep -> dependent creates a cycle iff dep is reachable from
    // dependent by following successor edges (dependent -> ... -> dep).
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(dependent.to_string());
    seen.insert(dependent.to_string());
    while let Some(node) = queue.pop_front() {
      if node == dep {
        return Ok(false);
      }
      for next in inner.successors.get(&node).into_iter().flatten() {
        if seen.insert(next.clone()) {
          queue.push_back(next.clone());
        }
      }
    }
    Ok(true)
  }
}

enum Direction {
  Successors,
  Predecessors,
}

type DfsState = DfsStateInner;
#[derive(Clone, Copy, PartialEq)]
enum DfsStateInner {
  Visiting,
  Done,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn three_tier() -> DependencyGraph {
    let g = DependencyGraph::new();
    g.add_service("db");
    g.add_service("webapp");
    g.add_service("proxy");
    g.add_dependency("webapp", "db").unwrap();
    g.add_dependency("proxy", "webapp").unwrap();
    g
  }

  #[test]
  fn topological_order_places_dependencies_first() {
    let g = three_tier();
    assert_eq!(
      g.topological_order().unwrap(),
      vec!["db".to_string(), "webapp".to_string(), "proxy".to_string()]
    );
  }

  #[test]
  fn topological_order_breaks_ties_lexically() {
    let g = DependencyGraph::new();
    g.add_service("c");
    g.add_service("b");
    g.add_service("a");
    assert_eq!(
      g.topological_order().unwrap(),
      vec!["a".to_string(), "b".to_string(), "c".to_string()]
    );
  }

  #[test]
  fn add_service_is_idempotent() {
    let g = DependencyGraph::new();
    g.add_service("a");
    g.add_service("a");
    assert_eq!(g.dependencies("a").unwrap(), Vec::<String>::new());
  }

  #[test]
  fn add_dependency_rejects_self_edge() {
    let g = DependencyGraph::new();
    g.add_service("a");
    assert_eq!(
      g.add_dependency("a", "a"),
      Err(GraphError::SelfDependency("a".to_string()))
    );
  }

  #[test]
  fn add_dependency_rejects_empty_name() {
    let g = DependencyGraph::new();
    assert_eq!(
      g.add_dependency("", "a"),
      Err(GraphError::EmptyServiceName)
    );
  }

  #[test]
  fn cycle_is_detected_and_reported_with_witness() {
    let g = DependencyGraph::new();
    g.add_dependency("b", "a").unwrap();
    g.add_dependency("c", "b").unwrap();
    g.add_dependency("a", "c").unwrap();

    assert_eq!(g.topological_order(), Err(GraphError::Cycle));

    let cycle = g.find_cycle().expect("cycle expected");
    assert_eq!(cycle.first(), cycle.last());
    for pair in cycle.windows(2) {
      let deps = g.dependents(&pair[0]).unwrap();
      assert!(deps.contains(&pair[1]));
    }
  }

  #[test]
  fn unknown_service_queries_fail() {
    let g = DependencyGraph::new();
    assert_eq!(
      g.dependencies("ghost"),
      Err(GraphError::UnknownService("ghost".to_string()))
    );
  }

  #[test]
  fn can_add_dependency_detects_future_cycle() {
    let g = three_tier();
    // db -> webapp -> proxy already exists (dependency direction).
    // Adding "db depends on proxy" would close a cycle.
    assert_eq!(g.can_add_dependency("db", "proxy"), Ok(false));
    assert_eq!(g.can_add_dependency("proxy", "db"), Ok(true));
  }

  #[test]
  fn transitive_closures_exclude_self() {
    let g = three_tier();
    assert_eq!(
      g.transitive_dependencies("proxy").unwrap(),
      vec!["db".to_string(), "webapp".to_string()]
    );
    assert_eq!(
      g.transitive_dependents("db").unwrap(),
      vec!["proxy".to_string(), "webapp".to_string()]
    );
  }
}
