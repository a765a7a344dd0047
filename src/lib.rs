//! cairo-prof core library: request resolution, the profiling pipeline and
//! the subcommands the CLI dispatches to.

mod cmd;
mod config;
mod naming;
mod outcome;
mod pipeline;
mod platform;
mod request;
mod tracefile;

#[cfg(test)]
mod testing;

pub use cmd::*;
pub use config::*;
pub use naming::*;
pub use outcome::*;
pub use pipeline::*;
pub use platform::*;
pub use request::*;
pub use tracefile::*;
