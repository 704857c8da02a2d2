//! `engine` crate — process definitions, graph validation, the versioned
//! definition registry, and the per-instance state machine.

pub mod defaults;
pub mod error;
pub mod gateway;
pub mod graph;
pub mod machine;
pub mod memory;
pub mod models;
pub mod registry;
pub mod store;

pub use error::{DefinitionError, EngineError};
pub use machine::{ProcessMachine, Timeline};
pub use memory::MemoryInstanceStore;
pub use models::{
    Actor, DecisionCandidate, InstanceStatus, Lane, ProcessDefinition, ProcessInstance, Step,
    StepAutomation, StepInstance, StepInstanceStatus, StepType,
};
pub use registry::DefinitionRegistry;
pub use store::{Advance, CloseStep, InstanceStore, StoreError};
