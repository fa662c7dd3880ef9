//! CLI domain: parse, route and output only.

mod output;
mod parse;
mod route;

pub use output::{format_result, map_error};
pub use parse::{Cli, Commands, OperationKindArg};
pub use route::RunContext;
