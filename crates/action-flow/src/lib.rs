//! Action Flow Interpreter
//!
//! Executes flat, block-structured action programs: `if`/`else`/`end`,
//! `while`, `repeat`, `foreach` and a one-shot `on_error` handler are resolved
//! through jump tables built once per run, while leaf actions are delegated
//! to an [`ActionExecutor`] supplied by the caller.

pub mod block_map;
pub mod condition;
pub mod context;
pub mod errors;
pub mod executor;
pub mod frame;
pub mod types;
pub mod vars;

pub use block_map::{BlockMap, StructureDiagnostic};
pub use context::{ActionContext, ActionExecutor, BehaviorFlags, PageConditions};
pub use errors::FlowError;
pub use executor::{FlowExecutor, FlowInterpreter, InterpreterOptions, RunReport, Termination};
pub use frame::{ErrorHandler, ExecutionFrame, LoopState, RunLog};
pub use types::{
    parse_actions, parse_program, Action, ActionKind, ActionSpec, BlockKind, Comparison,
    Condition, ForeachSource, NumberOp, StructuredCondition, TextOp, TypeMode,
};
pub use vars::RuntimeVars;
