//! Unipile Gateway Integration - outbound messaging and webhook ingest
//!
//! This crate is the only place that knows the gateway's wire surface:
//! - **Client** (`client`) - HTTP calls for sending chat messages and
//!   resolving attendee profiles
//! - **Receipts** (`receipt`) - tolerant decoding of send responses
//! - **Webhooks** (`webhook`) - classification and field extraction for
//!   inbound deliveries (new relations, new messages)
//!
//! The gateway's payloads are schema-unstable across API versions, so every
//! decoder here works from ordered candidate paths rather than fixed serde
//! shapes.

pub mod client;
pub mod receipt;
pub mod webhook;

pub use client::{AttendeeProfile, GatewayError, MessagingGateway, UnipileClient};
pub use receipt::SendReceipt;
pub use webhook::{MessageEvent, RelationEvent, WebhookKind};
