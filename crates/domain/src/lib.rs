//! Shared domain types for the Alfred core.
//!
//! Everything here is plain data: the error taxonomy, the recognized
//! configuration options, plan steps and their execution records, entity
//! mentions and constraints, the table schema catalog, the interpreter
//! trait, the streaming event grammar, and structured trace events.
//! No I/O happens in this crate.

pub mod config;
pub mod error;
pub mod event;
pub mod interpreter;
pub mod mention;
pub mod schema;
pub mod step;
pub mod trace;

pub use config::AlfredConfig;
pub use error::{Error, ErrorCode, Result};
pub use event::{NodeName, PhaseStatus, TurnEvent};
pub use interpreter::{CallConfig, Interpreter, InterpreterRequest, ResponseShape};
pub use mention::{
    Confidence, Constraint, ConstraintKind, ConstraintSnapshot, EntityCuration, EntityMention,
    Resolution, RetainedRef,
};
pub use step::{
    BatchItem, BatchItemStatus, BatchManifest, Step, StepResult, StepType, TurnExecutionSummary,
};
