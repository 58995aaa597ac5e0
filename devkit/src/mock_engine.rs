/*!
Moteur de conteneurs et tracker de vivacité simulés

Le moteur renvoie des informations vides, le tracker enregistre les appels
pour les assertions des tests.
*/

use edge_telemetry::{ContainerStats, EngineClient, EngineError, LivenessTracker, NodeInfo};
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct MockEngine;

impl MockEngine {
    pub fn new() -> Self {
        Self
    }
}

impl EngineClient for MockEngine {
    fn orchestrator(&self) -> &str {
        "mock"
    }

    fn node_info(&self) -> Result<NodeInfo, EngineError> {
        Ok(NodeInfo::default())
    }

    fn container_stats(&self) -> Result<Vec<ContainerStats>, EngineError> {
        Ok(Vec::new())
    }
}

/// Liveness tracker keeping every `mark_running` call in order
#[derive(Debug, Default)]
pub struct RecordingTracker {
    marks: Mutex<Vec<String>>,
}

impl RecordingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, component: &str) -> usize {
        self.marks.lock().iter().filter(|c| c.as_str() == component).count()
    }
}

impl LivenessTracker for RecordingTracker {
    fn mark_running(&self, component: &str) {
        self.marks.lock().push(component.to_string());
    }
}
