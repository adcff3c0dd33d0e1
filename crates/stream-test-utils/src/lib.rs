//! # Stream Test Utilities
//!
//! Mocks and fixtures for driving a `StreamingSession` by hand, without the
//! simulation harness.
//!
//! ## Modules
//!
//! - `mock_scheduler` - Manually advanced clock and timer table
//! - `mock_transport` - Recording transport with injectable failures
//! - `fixtures` - Addresses, configs and encoded frames
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stream_test_utils::*;
//!
//! let transport = MockTransport::new();
//! let mut scheduler = ManualScheduler::new();
//! let mut session = StreamingSession::new(server_config(), 0, transport.clone());
//!
//! session.start(&mut scheduler).unwrap();
//! transport.push_inbound(request_frame(client_addr(), 0, SimTime::ZERO), client_addr());
//! session.on_data_available(&mut scheduler);
//!
//! scheduler.fire_next(&mut session);
//! assert_eq!(transport.sent_count(), 1);
//! ```

pub mod fixtures;
pub mod mock_scheduler;
pub mod mock_transport;

pub use fixtures::*;
pub use mock_scheduler::*;
pub use mock_transport::*;
