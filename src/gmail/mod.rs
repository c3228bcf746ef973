//! Gmail REST API surface: authorized client, resource models and the
//! builders for queries, drafts and labels.

pub mod client;
pub mod label;
pub mod message;
pub mod models;
pub mod query;
pub mod send;
pub mod thread;

pub use client::{GMAIL_API_BASE, GmailClient};
pub use label::{Label, LabelListVisibility, MessageListVisibility, NewLabel};
pub use message::{Address, AttachmentRef, Message, MessageStream};
pub use query::MessageQuery;
pub use send::SendMessage;
pub use thread::{Thread, ThreadStream};
