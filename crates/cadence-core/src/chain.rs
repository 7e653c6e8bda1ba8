//! Stage chains: arena-backed sequences with cross-stage reply propagation.
//!
//! A `Chain` owns its stages in an arena (`Vec<Stage>`) and links them with
//! `next` indices, so "this stage and everything after it" is just an index.
//! Topology is validated before anything dispatches: link targets are bounds
//! checked and `petgraph` toposort rejects cycles. The run walks from the
//! entry stage, carrying each stage's final accepted reply into its
//! successor, and returns a `ChainReport` when the walk ends.

use cadence_types::reply::Reply;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::stage::{Stage, StageOutcome};
use crate::transport::Transport;

/// Errors detected when validating a chain's topology.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The chain has no stages.
    #[error("chain has no stages")]
    Empty,

    /// A link names an arena index that does not exist.
    #[error("stage {from} links to unknown stage index {to}")]
    DanglingLink { from: usize, to: usize },

    /// The links loop back on themselves.
    #[error("stage links form a cycle involving stage {0}")]
    CycleDetected(usize),
}

/// An ordered sequence of stages executed one after another.
///
/// The first pushed stage is the entry point. A successor starts only after
/// its predecessor reaches shutdown, whether it succeeded or exhausted its
/// queue.
#[derive(Debug, Default)]
pub struct Chain {
    stages: Vec<Stage>,
}

impl Chain {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Appends a stage and returns its arena index.
    pub fn push(&mut self, stage: Stage) -> usize {
        self.stages.push(stage);
        self.stages.len() - 1
    }

    /// Points `from`'s next link at `to`.
    pub fn link(&mut self, from: usize, to: usize) -> Result<(), ChainError> {
        if from >= self.stages.len() || to >= self.stages.len() {
            return Err(ChainError::DanglingLink { from, to });
        }
        self.stages[from].set_next(to);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    /// Checks the chain topology without running anything.
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.stages.is_empty() {
            return Err(ChainError::Empty);
        }

        let mut graph = DiGraph::<usize, ()>::new();
        let nodes: Vec<_> = (0..self.stages.len()).map(|i| graph.add_node(i)).collect();
        for (from, stage) in self.stages.iter().enumerate() {
            if let Some(to) = stage.next() {
                if to >= self.stages.len() {
                    return Err(ChainError::DanglingLink { from, to });
                }
                graph.add_edge(nodes[from], nodes[to], ());
            }
        }

        toposort(&graph, None)
            .map(|_| ())
            .map_err(|cycle| ChainError::CycleDetected(graph[cycle.node_id()]))
    }

    /// Runs the chain to completion, starting from the entry stage.
    ///
    /// Stages execute strictly one at a time. Each stage receives its
    /// predecessor's final accepted reply; an exhausted predecessor carries
    /// nothing forward. Consumes the chain -- a chain runs exactly once.
    pub async fn run<T: Transport>(mut self, transport: &T) -> Result<ChainReport, ChainError> {
        self.validate()?;

        let run_id = Uuid::now_v7();
        info!(run_id = %run_id, stages = self.stages.len(), "starting chain run");

        let mut summaries = Vec::new();
        let mut carried: Option<Reply> = None;
        let mut current = Some(0);

        while let Some(index) = current {
            let stage = &mut self.stages[index];
            let outcome = stage.run(transport, carried.as_ref()).await;
            carried = stage.last_reply().cloned();
            summaries.push(StageSummary {
                name: stage.name().to_string(),
                outcome,
                reply: carried.clone(),
            });
            current = stage.next();
        }

        let succeeded = summaries
            .iter()
            .filter(|s| s.outcome == StageOutcome::Succeeded)
            .count();
        info!(
            run_id = %run_id,
            stages = summaries.len(),
            succeeded,
            "chain run complete"
        );

        Ok(ChainReport {
            run_id,
            stages: summaries,
            final_reply: carried,
        })
    }
}

/// Result of a completed chain run.
#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    /// UUIDv7 run id, stamped when the run starts.
    pub run_id: Uuid,
    /// Per-stage outcomes, in execution order.
    pub stages: Vec<StageSummary>,
    /// The last executed stage's accepted reply, if it succeeded.
    pub final_reply: Option<Reply>,
}

/// One executed stage's outcome within a chain run.
#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    /// Stage name.
    pub name: String,
    /// How the stage ended.
    pub outcome: StageOutcome,
    /// The accepted reply, when the stage succeeded.
    pub reply: Option<Reply>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
