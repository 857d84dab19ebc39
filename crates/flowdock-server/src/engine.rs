//! Flow engine contract
//!
//! The execution engine is an external collaborator. The registration
//! pipeline only needs it to (re)initialize one flow from its definition;
//! everything about how a flow then runs stays on the engine's side.

use async_trait::async_trait;
use dashmap::DashMap;
use flowdock_core::FlowDefinition;
use thiserror::Error;
use tracing::{debug, info};

/// Error reported by the engine for one flow
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to load flow {flow_id}: {message}")]
pub struct EngineError {
    pub flow_id: String,
    pub message: String,
}

impl EngineError {
    pub fn new(flow_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            message: message.into(),
        }
    }
}

/// The engine side of the contract
#[async_trait]
pub trait FlowEngine: Send + Sync {
    /// Re-initialize one flow from `flow`, resolving once the engine is done
    async fn load(&self, flow_id: &str, flow: &FlowDefinition) -> Result<(), EngineError>;
}

/// A loaded flow as last seen by [`LocalFlowEngine`]
#[derive(Debug, Clone)]
pub struct LoadedFlow {
    pub definition: FlowDefinition,
    pub loads: u64,
}

/// In-process engine that records the latest definition of every flow.
///
/// Used when no external engine is attached; it accepts every definition.
#[derive(Debug, Default)]
pub struct LocalFlowEngine {
    flows: DashMap<String, LoadedFlow>,
}

impl LocalFlowEngine {
    pub fn new() -> Self {
        info!("Creating local flow engine");
        Self::default()
    }

    /// Number of distinct flows loaded so far
    pub fn loaded_count(&self) -> usize {
        self.flows.len()
    }

    /// Last definition loaded for `flow_id`
    pub fn loaded(&self, flow_id: &str) -> Option<LoadedFlow> {
        self.flows.get(flow_id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl FlowEngine for LocalFlowEngine {
    async fn load(&self, flow_id: &str, flow: &FlowDefinition) -> Result<(), EngineError> {
        let mut entry = self
            .flows
            .entry(flow_id.to_string())
            .or_insert_with(|| LoadedFlow {
                definition: flow.clone(),
                loads: 0,
            });
        entry.definition = flow.clone();
        entry.loads += 1;

        debug!(%flow_id, components = flow.components.len(), loads = entry.loads, "Flow loaded");
        Ok(())
    }
}
