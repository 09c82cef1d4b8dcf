pub mod app;
pub mod check;
pub mod commands;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod extract;
pub mod info;
pub mod output;
pub mod run;
pub mod runtime;
pub mod schema;
pub mod worker;

pub use check::{cmd_check, CheckArgs};
pub use extract::{cmd_extract, ExtractArgs};
pub use run::{cmd_run, RunArgs};
pub use schema::{cmd_schema, SchemaArgs};
