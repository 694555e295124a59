//! # herald-core
//!
//! Outbound dispatch and arrival tracking for the Herald chat bot.
//!
//! - **CooldownQueue** - per-destination FIFO releasing one message per cooldown
//! - **DestinationRegistry** - lazily creates exactly one queue per destination
//! - **ArrivalTracker** - deduplicates viewer joins ahead of welcome passes
//! - **Sender** - the seam to whatever transport performs the network send
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐     ┌──────────────┐     ┌───────────────┐     ┌────────┐
//! │  Producer  │────▶│   Registry   │────▶│ CooldownQueue │────▶│ Sender │
//! └────────────┘     └──────────────┘     └───────────────┘     └────────┘
//!       │
//!       ▼
//! ┌────────────┐
//! │  Arrivals  │
//! └────────────┘
//! ```

pub mod arrivals;
pub mod destination;
pub mod message;
pub mod queue;
pub mod registry;
pub mod sender;

pub use arrivals::{ArrivalOutcome, ArrivalStats, ArrivalTracker, WelcomeBatch};
pub use destination::{normalize_identity, Destination, DestinationError, DestinationKind};
pub use message::{MessageError, MessageKind, OutboundMessage};
pub use queue::{CooldownQueue, QueueConfig, QueueError, QueueStats};
pub use registry::{DestinationRegistry, RegistryConfig, RegistryStats};
pub use sender::{FailureHandler, SendError, Sender};
