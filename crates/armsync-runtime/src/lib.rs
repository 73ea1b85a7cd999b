//! ARMSYNC Runtime - Replica actor and session bootstrap
//!
//! Each peer runs one [`ReplicaNode`] task. The node merges three event
//! sources into a single loop:
//! 1. Local toggle commands from its [`NodeHandle`]
//! 2. Payloads delivered by the transport
//! 3. Membership events from the peer directory
//!
//! [`SessionJoiner`] brings the peer into its session, [`ToggleSurface`]
//! shows the value and [`RuntimeConfig`] holds the knobs for all of it.

pub mod bootstrap;
pub mod config;
pub mod joiner;
pub mod logging;
pub mod node;
pub mod surface;

pub use bootstrap::*;
pub use config::*;
pub use joiner::*;
pub use logging::*;
pub use node::*;
pub use surface::*;
