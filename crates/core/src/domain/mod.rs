pub mod client;
pub mod invitation;
pub mod lead;
pub mod message;
pub mod thread;
