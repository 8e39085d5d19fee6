//! Session bookkeeping for Tether.
//!
//! This crate covers the two things that sit between the raw transport and
//! the connection state machine:
//!
//! 1. **Approval**: deciding who may join a hosted session and remembering
//!    them by durable identity ([`ApprovalRegistry`])
//! 2. **Directory**: asking an outside service where sessions live
//!    ([`SessionDirectory`] trait, [`DirectAddressDirectory`] for LANs)
//!
//! # How it fits in the stack
//!
//! ```text
//! Connection Layer (above)  ← drives the registry from host-side hooks
//!     ↕
//! Session Layer (this crate)  ← player records, admission rules, directory
//!     ↕
//! Protocol Layer (below)  ← provides PlayerId, ApprovalRequest/Response
//! ```

#![allow(async_fn_in_trait)]

mod directory;
mod error;
mod record;
mod registry;

pub use directory::{DirectAddressDirectory, SessionDirectory, SessionId, SessionTicket};
pub use error::{DirectoryError, SessionError};
pub use record::{AdmissionRules, SessionPlayerRecord};
pub use registry::ApprovalRegistry;
