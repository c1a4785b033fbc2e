//! Service layer: the synthesis loop and the policies it consults.

pub mod acceptance_store;
pub mod context_extractor;
pub mod iteration_controller;
pub mod prompt_builder;
pub mod retry_policy;
pub mod run_context;
pub mod sandbox_policy;
pub mod test_layout;

pub use acceptance_store::{
    AcceptanceManifest, AcceptanceStore, CommitReceipt, RollbackOutcome, StageTicket,
    MANIFEST_FILE,
};
pub use context_extractor::SourceContext;
pub use iteration_controller::{
    ControllerEvent, ControllerPorts, ControllerSettings, IterationController,
};
pub use prompt_builder::PromptBuilder;
pub use retry_policy::{Backoff, RetryPolicy};
pub use run_context::{RunBudget, RunContext};
pub use sandbox_policy::{EffectKind, PolicyViolation, SandboxPolicy};
pub use test_layout::TestLayout;
