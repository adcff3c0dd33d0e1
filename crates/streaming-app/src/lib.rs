//! Streaming traffic generator library.
//!
//! A pair of cooperating applications for network simulations:
//!
//! - A **server** streams constant-bit-rate packets to whichever endpoint
//!   most recently sent it a request, and pauses once requests stop.
//! - A **client** sends a request every `request_interval` and measures
//!   throughput and one-way delay of the stream it gets back.
//!
//! # Architecture
//!
//! ```text
//! driver (sim::Simulation or an external kernel)
//! ├── owns the virtual clock and event queue  -> runtime::Scheduler
//! ├── moves datagrams between nodes           -> runtime::Transport
//! └── invokes callbacks on each StreamingSession
//!     ├── pacing (CBR with residual-bit carryover)
//!     ├── liveness (server pauses after 2 x request_interval of silence)
//!     └── stats (bytes/packets in and out, drain-on-read delay sum)
//! ```
//!
//! Everything runs on one thread; callbacks are short and never block.
//!
//! # Modules
//!
//! - [`config`] - Session and scenario configuration
//! - [`errors`] - Error types
//! - [`observability`] - Metrics
//! - [`rate`] - Data rate type and parsing
//! - [`runtime`] - Scheduler and transport interfaces, virtual time
//! - [`session`] - The client/server state machine
//! - [`sim`] - In-process discrete-event harness

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod errors;
pub mod observability;
pub mod rate;
pub mod runtime;
pub mod session;
pub mod sim;

pub use config::{Role, ScenarioConfig, SessionConfig};
pub use errors::{SessionError, TransportError};
pub use rate::DataRate;
pub use runtime::{Endpoint, Scheduler, SimTime, TimerHandle, TimerKind, Transport};
pub use session::{SessionState, StreamingSession};
