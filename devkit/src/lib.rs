/*!
# Edge DevKit - Doubles et utilitaires de test pour la télémétrie

Bibliothèque facilitant les tests de l'orchestrateur avec:
- Monitors simulés avec compteurs (refresh, contribute, constructions)
- Sondes de vivacité scriptées
- Moteur de conteneurs et tracker de vivacité simulés
- Capture des warnings émis pendant un test
- Harnais construisant un `Telemetry` complet avec ses files
*/

pub mod log_capture;
pub mod mock_engine;
pub mod mock_monitor;
pub mod probe;
pub mod test_utils;

pub use log_capture::WarningCapture;
pub use mock_engine::{MockEngine, RecordingTracker};
pub use mock_monitor::{MockBehavior, MockMonitor, MonitorCounters};
pub use probe::ScriptedProbe;
pub use test_utils::{HarnessRun, TestHarness};
