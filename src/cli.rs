//! CLI domain: parse, route and presentation only.
//! No domain orchestration; a single route table dispatches to the runtime.

mod parse;
mod presentation;
mod route;

pub use parse::{CircuitCommands, Cli, Commands, SwitchArg};
pub use route::RunContext;
