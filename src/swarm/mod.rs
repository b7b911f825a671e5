//! The agent swarm — worker pool, liveness registry, and supervisor.

pub mod agent;
pub mod registry;
#[allow(clippy::module_inception)]
pub mod swarm;

pub use agent::{Agent, AgentContext};
pub use registry::{AgentInfo, AgentRegistry, AgentState};
pub use swarm::Swarm;
