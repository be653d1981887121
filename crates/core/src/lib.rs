pub mod canonical;
pub mod config;
pub mod domain;
pub mod payload;

pub use canonical::canonicalize_profile_url;
pub use domain::client::Client;
pub use domain::invitation::{DmDraftStatus, Invitation, InvitationId, InvitationStatus};
pub use domain::lead::{ClientId, Lead, LeadId, LeadSource};
pub use domain::message::{Message, MessageDirection, MessageId, NewMessage};
pub use domain::thread::{Thread, ThreadId};
