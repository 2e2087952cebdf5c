//! VANET Message Routing
//!
//! Best-effort V2V delivery over the roles elected by `vanet-cluster`.
//!
//! # Contract
//!
//! - Priority: safety before control before info; FIFO within a class.
//! - Loop freedom: a message's visited set is never re-entered.
//! - Bounded: every hop spends one unit of time-to-live.
//! - Best effort: undeliverable messages are dropped with a reason, never retried.
//!
//! Digests are Blake3 hashes over sender, sequence, class, destination and
//! payload. They drive replay detection at ingress, and the per-sender replay
//! counts feed the proof-of-authority suspicion features.

mod error;
mod message;
mod router;
mod view;

pub use error::{Error, Result};
pub use message::{Destination, Digest, Message, MessageId, MessageKind, Outgoing};
pub use router::{Admission, DropReason, MessageRouter, RouteOutcome, RouterConfig, RouterStats};
pub use view::{FleetView, RoutingView};
