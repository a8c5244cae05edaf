use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use super::task::{Task, TaskId, TaskRole, TaskStatus};
use crate::error::{Error, PlanError};

/// Edge type in the DAG
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Regular dependency: source must complete before target starts
    #[default]
    Dependency,
    /// Fork edge: one shared artifact fanned out to independent targets
    Fork,
}

/// Specialists fanned out from one seed and joined into one arbiter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliberationGroup {
    pub seed: TaskId,
    /// Roster order
    pub specialists: Vec<TaskId>,
    pub arbiter: TaskId,
}

#[derive(Debug, Clone)]
pub struct DagManager {
    graph: DiGraph<TaskId, EdgeType>, // Node = task_id, Edge = relationship type
    tasks: HashMap<TaskId, Task>,
    indices: HashMap<TaskId, NodeIndex>,
    groups: Vec<DeliberationGroup>,
}

impl DagManager {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            tasks: HashMap::new(),
            indices: HashMap::new(),
            groups: Vec::new(),
        }
    }

    /// Add a task to the DAG
    pub fn add_task(&mut self, task: Task) -> Result<(), PlanError> {
        if self.tasks.contains_key(&task.id) {
            return Err(PlanError::DuplicateTask(task.id));
        }

        let idx = self.graph.add_node(task.id.clone());
        self.indices.insert(task.id.clone(), idx);
        self.tasks.insert(task.id.clone(), task);

        Ok(())
    }

    /// Add dependency: `task_id` depends on `depends_on_id`
    pub fn add_dependency(&mut self, task_id: &str, depends_on_id: &str) -> Result<(), PlanError> {
        self.add_edge(depends_on_id, task_id, EdgeType::Dependency)
    }

    fn index(&self, task_id: &str) -> Result<NodeIndex, PlanError> {
        self.indices
            .get(task_id)
            .copied()
            .ok_or_else(|| PlanError::UnknownTask(task_id.to_string()))
    }

    /// Add an edge, refusing self-references and anything that closes a cycle
    fn add_edge(&mut self, from_id: &str, to_id: &str, edge_type: EdgeType) -> Result<(), PlanError> {
        let from_idx = self.index(from_id)?;
        let to_idx = self.index(to_id)?;

        if from_idx == to_idx {
            return Err(PlanError::SelfDependency(to_id.to_string()));
        }
        if self.graph.find_edge(from_idx, to_idx).is_some() {
            return Ok(());
        }
        if has_path_connecting(&self.graph, to_idx, from_idx, None) {
            return Err(PlanError::Cycle {
                from: from_id.to_string(),
                to: to_id.to_string(),
            });
        }

        // Edge direction: from -> to
        self.graph.add_edge(from_idx, to_idx, edge_type);

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn add_edge_unchecked(&mut self, from_id: &str, to_id: &str) {
        if let (Some(&from), Some(&to)) = (self.indices.get(from_id), self.indices.get(to_id)) {
            self.graph.add_edge(from, to, EdgeType::Dependency);
        }
    }

    /// Fork: after `source` completes, all `targets` can run in parallel
    pub fn fork(&mut self, source: &str, targets: &[&str]) -> Result<(), PlanError> {
        for target in targets {
            self.add_edge(source, target, EdgeType::Fork)?;
        }
        Ok(())
    }

    /// Join: `target` starts only after all `sources` complete
    pub fn join(&mut self, sources: &[&str], target: &str) -> Result<(), PlanError> {
        for source in sources {
            self.add_edge(source, target, EdgeType::Dependency)?;
        }
        Ok(())
    }

    /// Wire a deliberation group: seed forks to every specialist, all join into the arbiter
    pub fn add_deliberation_group(
        &mut self,
        seed: &str,
        specialists: &[&str],
        arbiter: &str,
    ) -> Result<(), PlanError> {
        if specialists.is_empty() {
            return Err(PlanError::EmptyRoster);
        }
        self.fork(seed, specialists)?;
        self.join(specialists, arbiter)?;

        let group = DeliberationGroup {
            seed: seed.to_string(),
            specialists: specialists.iter().map(|s| s.to_string()).collect(),
            arbiter: arbiter.to_string(),
        };
        self.check_group(&group)?;
        self.groups.push(group);
        Ok(())
    }

    /// Structural checks for a group: fork edges in, join edges out, no edges between specialists
    fn check_group(&self, group: &DeliberationGroup) -> Result<(), PlanError> {
        let invalid = |msg: String| PlanError::InvalidGroup(msg);

        let arbiter_role = self.tasks.get(&group.arbiter).map(|t| t.role);
        if arbiter_role != Some(TaskRole::Arbiter) {
            return Err(invalid(format!("{} is not an arbiter task", group.arbiter)));
        }

        for (position, id) in group.specialists.iter().enumerate() {
            match self.tasks.get(id).map(|t| t.role) {
                Some(TaskRole::Specialist { position: p, .. }) if p == position => {}
                _ => {
                    return Err(invalid(format!(
                        "{} is not the specialist at roster position {}",
                        id, position
                    )))
                }
            }
            if self.edge_type(&group.seed, id) != Some(EdgeType::Fork) {
                return Err(invalid(format!("{} is not forked from {}", id, group.seed)));
            }
            if self.edge_type(id, &group.arbiter).is_none() {
                return Err(invalid(format!("{} does not feed {}", id, group.arbiter)));
            }
            for other in &group.specialists {
                if other != id && self.edge_type(id, other).is_some() {
                    return Err(invalid(format!("specialists {} and {} are linked", id, other)));
                }
            }
        }
        Ok(())
    }

    pub fn groups(&self) -> &[DeliberationGroup] {
        &self.groups
    }

    pub fn group_for_arbiter(&self, arbiter_id: &str) -> Option<&DeliberationGroup> {
        self.groups.iter().find(|g| g.arbiter == arbiter_id)
    }

    /// Get edge type between two tasks
    pub fn edge_type(&self, from_id: &str, to_id: &str) -> Option<EdgeType> {
        let from_idx = self.indices.get(from_id)?;
        let to_idx = self.indices.get(to_id)?;

        self.graph
            .find_edge(*from_idx, *to_idx)
            .and_then(|edge_idx| self.graph.edge_weight(edge_idx).copied())
    }

    /// Get task by ID
    pub fn get_task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    /// Get mutable task by ID
    pub fn get_task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(task_id)
    }

    /// All tasks in insertion order
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
            .filter_map(|id| self.tasks.get(id))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// First task (in insertion order) with the given role
    pub fn find_role(&self, role: TaskRole) -> Option<&Task> {
        self.tasks().find(|t| t.role == role)
    }

    /// The task whose success decides the run
    pub fn terminal(&self) -> Option<&Task> {
        self.find_role(TaskRole::Finalize)
    }

    fn neighbor_ids(&self, task_id: &str, direction: Direction) -> Vec<TaskId> {
        let Some(&idx) = self.indices.get(task_id) else {
            return vec![];
        };

        let mut neighbors: Vec<NodeIndex> =
            self.graph.neighbors_directed(idx, direction).collect();
        neighbors.sort();
        neighbors.dedup();
        neighbors
            .into_iter()
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect()
    }

    /// Ids this task depends on, in insertion order
    pub fn dependencies(&self, task_id: &str) -> Vec<TaskId> {
        self.neighbor_ids(task_id, Direction::Incoming)
    }

    /// Ids that depend on this task, in insertion order
    pub fn dependents(&self, task_id: &str) -> Vec<TaskId> {
        self.neighbor_ids(task_id, Direction::Outgoing)
    }

    /// Pending tasks whose dependencies have all succeeded
    pub fn ready_tasks(&self) -> Vec<&Task> {
        self.tasks()
            .filter(|task| task.is_pending())
            .filter(|task| {
                self.dependencies(&task.id)
                    .iter()
                    .all(|dep| self.tasks.get(dep).map(|t| t.is_succeeded()).unwrap_or(false))
            })
            .collect()
    }

    /// Partition into phases with Kahn's algorithm
    ///
    /// Phase k holds every task whose dependencies all sit in phases 0..k.
    /// Ids within a phase keep insertion order.
    pub fn phases(&self) -> Result<Vec<Vec<TaskId>>, Error> {
        let mut indegree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| (idx, self.graph.edges_directed(idx, Direction::Incoming).count()))
            .collect();

        let mut current: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| indegree.get(idx) == Some(&0))
            .collect();
        let mut phases = Vec::new();
        let mut placed = 0;

        while !current.is_empty() {
            placed += current.len();
            let mut next = Vec::new();
            for idx in &current {
                for edge in self.graph.edges_directed(*idx, Direction::Outgoing) {
                    if let Some(d) = indegree.get_mut(&edge.target()) {
                        *d -= 1;
                        if *d == 0 {
                            next.push(edge.target());
                        }
                    }
                }
            }
            next.sort();
            phases.push(
                current
                    .iter()
                    .filter_map(|idx| self.graph.node_weight(*idx).cloned())
                    .collect(),
            );
            current = next;
        }

        if placed < self.graph.node_count() {
            let unresolved = self
                .graph
                .node_indices()
                .filter(|idx| indegree.get(idx).copied().unwrap_or(0) > 0)
                .filter_map(|idx| self.graph.node_weight(idx).cloned())
                .collect();
            return Err(Error::Deadlock { unresolved });
        }

        Ok(phases)
    }

    /// Flattened phase order
    pub fn execution_order(&self) -> Result<Vec<TaskId>, Error> {
        Ok(self.phases()?.into_iter().flatten().collect())
    }

    /// Update task status
    pub fn update_status(&mut self, task_id: &str, status: TaskStatus) -> Result<(), PlanError> {
        let task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| PlanError::UnknownTask(task_id.to_string()))?;
        task.status = status;
        Ok(())
    }

    /// Check if all tasks are terminal
    pub fn is_complete(&self) -> bool {
        self.tasks.values().all(|t| t.is_terminal())
    }

    /// Get completion statistics
    pub fn stats(&self) -> DagStats {
        let mut stats = DagStats {
            total: self.tasks.len(),
            ..Default::default()
        };
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending | TaskStatus::Ready => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Succeeded => stats.succeeded += 1,
                TaskStatus::Failed { .. } => stats.failed += 1,
                TaskStatus::TimedOut { .. } => stats.timed_out += 1,
                TaskStatus::Skipped { .. } => stats.skipped += 1,
            }
        }
        stats
    }
}

impl Default for DagManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Edge relationship for serialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Source task (from)
    pub from: TaskId,
    /// Target task (to)
    pub to: TaskId,
    /// Type of relationship
    #[serde(default)]
    pub edge_type: EdgeType,
}

/// Serializable DAG state for persistence and inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagState {
    pub tasks: Vec<Task>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub groups: Vec<DeliberationGroup>,
}

impl DagManager {
    pub fn to_state(&self) -> DagState {
        let edges = self
            .graph
            .edge_references()
            .filter_map(|edge_ref| {
                let from = self.graph.node_weight(edge_ref.source())?;
                let to = self.graph.node_weight(edge_ref.target())?;
                Some(Edge {
                    from: from.clone(),
                    to: to.clone(),
                    edge_type: *edge_ref.weight(),
                })
            })
            .collect();

        DagState {
            tasks: self.tasks().cloned().collect(),
            edges,
            groups: self.groups.clone(),
        }
    }

    /// Rebuild from a saved state, re-running every structural check
    pub fn from_state(state: DagState) -> Result<Self, PlanError> {
        let mut dag = Self::new();

        for task in state.tasks {
            dag.add_task(task)?;
        }

        for edge in state.edges {
            dag.add_edge(&edge.from, &edge.to, edge.edge_type)?;
        }

        for group in state.groups {
            dag.check_group(&group)?;
            dag.groups.push(group);
        }

        Ok(dag)
    }

    /// Save DAG to JSON file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.to_state())?;
        fs::write(path, json).context("Failed to write DAG state")?;
        Ok(())
    }

    /// Load DAG from JSON file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = fs::read_to_string(path).context("Failed to read DAG state")?;
        let state: DagState = serde_json::from_str(&json)?;
        Ok(Self::from_state(state)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DagStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deliberation::SpecialistKind;

    fn local(id: &str) -> Task {
        Task::new(id, id.to_uppercase(), TaskRole::EquipmentAssessment)
    }

    fn specialist(id: &str, position: usize) -> Task {
        Task::new(
            id,
            id,
            TaskRole::Specialist {
                kind: SpecialistKind::ALL[position],
                position,
            },
        )
    }

    #[test]
    fn test_dag_basic() {
        let mut dag = DagManager::new();
        dag.add_task(local("task-1")).unwrap();
        dag.add_task(local("task-2")).unwrap();
        dag.add_task(local("task-3")).unwrap();

        dag.add_dependency("task-2", "task-1").unwrap();
        dag.add_dependency("task-3", "task-2").unwrap();

        let ready = dag.ready_tasks();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, "task-1");

        dag.get_task_mut("task-1").unwrap().succeed();

        let ready = dag.ready_tasks();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, "task-2");
    }

    #[test]
    fn test_phases_layering() {
        let mut dag = DagManager::new();
        for id in ["a", "b", "c", "d"] {
            dag.add_task(local(id)).unwrap();
        }
        dag.add_dependency("c", "a").unwrap();
        dag.add_dependency("c", "b").unwrap();
        dag.add_dependency("d", "c").unwrap();
        dag.add_dependency("d", "a").unwrap();

        let phases = dag.phases().unwrap();
        assert_eq!(phases, vec![vec!["a", "b"], vec!["c"], vec!["d"]]);
        assert_eq!(dag.execution_order().unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut dag = DagManager::new();
        dag.add_task(local("a")).unwrap();
        dag.add_task(local("b")).unwrap();
        dag.add_dependency("a", "b").unwrap();

        let err = dag.add_dependency("b", "a").unwrap_err();
        assert!(matches!(err, PlanError::Cycle { .. }));
        assert_eq!(
            dag.add_dependency("a", "a").unwrap_err(),
            PlanError::SelfDependency("a".to_string())
        );
        assert_eq!(
            dag.add_dependency("a", "ghost").unwrap_err(),
            PlanError::UnknownTask("ghost".to_string())
        );
    }

    #[test]
    fn test_phases_report_deadlock_on_forced_cycle() {
        let mut dag = DagManager::new();
        dag.add_task(local("root")).unwrap();
        dag.add_task(local("a")).unwrap();
        dag.add_task(local("b")).unwrap();
        dag.add_dependency("a", "root").unwrap();
        dag.add_dependency("b", "a").unwrap();
        dag.add_edge_unchecked("b", "a");

        match dag.phases() {
            Err(Error::Deadlock { unresolved }) => assert_eq!(unresolved, vec!["a", "b"]),
            other => panic!("expected deadlock, got {:?}", other),
        }
    }

    #[test]
    fn test_deliberation_group() {
        let mut dag = DagManager::new();
        dag.add_task(local("seed")).unwrap();
        dag.add_task(specialist("s0", 0)).unwrap();
        dag.add_task(specialist("s1", 1)).unwrap();
        dag.add_task(Task::new("arb", "Arbiter", TaskRole::Arbiter)).unwrap();

        dag.add_deliberation_group("seed", &["s0", "s1"], "arb").unwrap();

        assert_eq!(dag.edge_type("seed", "s0"), Some(EdgeType::Fork));
        assert_eq!(dag.edge_type("s1", "arb"), Some(EdgeType::Dependency));
        let group = dag.group_for_arbiter("arb").unwrap();
        assert_eq!(group.specialists, vec!["s0", "s1"]);
        assert_eq!(dag.dependencies("arb"), vec!["s0", "s1"]);
        assert_eq!(dag.phases().unwrap().len(), 3);
    }

    #[test]
    fn test_group_rejects_misordered_roster() {
        let mut dag = DagManager::new();
        dag.add_task(local("seed")).unwrap();
        dag.add_task(specialist("s0", 0)).unwrap();
        dag.add_task(specialist("s1", 1)).unwrap();
        dag.add_task(Task::new("arb", "Arbiter", TaskRole::Arbiter)).unwrap();

        let err = dag
            .add_deliberation_group("seed", &["s1", "s0"], "arb")
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidGroup(_)));
    }

    #[test]
    fn test_state_roundtrip_keeps_groups() {
        let mut dag = DagManager::new();
        dag.add_task(local("seed")).unwrap();
        dag.add_task(specialist("s0", 0)).unwrap();
        dag.add_task(Task::new("arb", "Arbiter", TaskRole::Arbiter)).unwrap();
        dag.add_deliberation_group("seed", &["s0"], "arb").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dag.json");
        dag.save(&path).unwrap();

        let loaded = DagManager::load(&path).unwrap();
        assert_eq!(loaded.groups(), dag.groups());
        assert_eq!(loaded.phases().unwrap(), dag.phases().unwrap());
    }
}
