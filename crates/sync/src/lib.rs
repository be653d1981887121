//! Synchronization services - identity resolution and message mirroring
//!
//! The services in this crate sit between the repositories and the
//! gateway client:
//! - **Reconciler** (`reconciler`) - attaches provider member ids to leads
//!   when a connection is accepted, replay-safe
//! - **Sender** (`sender`) - outbound sends with exactly-once local
//!   mirroring
//! - **Resolver** (`resolver`) - best-effort attendee identity resolution
//!   with an in-process cache
//! - **Backfill** (`backfill`) - cursor-driven replay of historical
//!   invitation events through the reconciler

pub mod backfill;
pub mod reconciler;
pub mod resolver;
pub mod sender;

pub use backfill::{BackfillCounts, BackfillPage, BackfillRunner};
pub use reconciler::{ReconcileOutcome, ReconcileReport, Reconciler, RelationEventInput};
pub use resolver::{AttendeeResolver, ResolvedAttendee};
pub use sender::{OutboundSender, SendError, SendReport};
