//! Action Primitives - Leaf operations for browserflow programs
//!
//! This crate turns validated leaf actions into calls on a [`BrowserDriver`]:
//! - page primitives: navigate, click, hover, type, press, select, scroll,
//!   wait, screenshot
//! - data primitives: set, merge, csv
//! - javascript extraction through a [`script_sandbox::ScriptSandbox`]
//! - sub-task launching over HTTP
//!
//! [`PrimitiveExecutor`] and [`SnapshotConditions`] plug these into the
//! interpreter; [`StaticPageDriver`] backs dry runs and tests.

pub mod conditions;
pub mod driver;
pub mod errors;
pub mod executor;
pub mod launcher;
mod primitives;
pub mod static_driver;
pub mod types;

pub use conditions::SnapshotConditions;
pub use driver::BrowserDriver;
pub use errors::*;
pub use executor::PrimitiveExecutor;
pub use launcher::{DisabledLauncher, HttpTaskLauncher, TaskLauncher};
pub use primitives::*;
pub use static_driver::{strip_non_content, StaticPageDriver};
pub use types::*;
