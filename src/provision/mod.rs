//! Workstation provisioning pipeline.
//!
//! ## Module structure
//! - `types` - step identifiers, step state, outcomes
//! - `policy` - failure policies shared by steps and operations
//! - `context` - the `Host` handle installers act through
//! - `apt` - package manager wrapper
//! - `deb` - `.deb` artifact installer
//! - `docker` - Docker Engine from the vendor repository
//! - `rbenv` - rbenv, ruby-build and Ruby versions
//! - `profile` - managed blocks in startup files
//! - `customize` - shell prompt, helpers and aliases
//! - `orchestrator` - runs the steps in order
//! - `report` - plan and status views

mod apt;
mod context;
mod customize;
mod deb;
mod docker;
mod orchestrator;
mod policy;
mod profile;
mod rbenv;
mod report;
mod types;

pub use context::Host;
pub use orchestrator::Provisioner;
pub use report::{inspect, plan};
pub use types::{ProvisionState, StepId, StepStatus};

#[cfg(test)]
pub(crate) use context::testing;
