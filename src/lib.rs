//! Gmail mailbox access for Rust services.
//!
//! The crate covers three layers:
//!
//! - [`auth`]: OAuth 2.0 installed-app flows with local token storage. A
//!   [`Session`] turns client secrets into refreshed [`Credentials`].
//! - [`gmail`]: an authorized REST client over messages, threads and
//!   labels, with lazy pagination and a draft builder for sending.
//! - [`watch`]: incremental change polling over the history API with
//!   at-least-once delivery to registered handlers.
//!
//! ```no_run
//! use gmailbox::{GmailClient, Handler, MessageQuery, Session, Watcher, WatcherConfig};
//!
//! # async fn demo() -> gmailbox::Result<()> {
//! let session = Session::new("client_secret.json", "me")?;
//! let credentials = session.authenticate().await?;
//! let client = GmailClient::new(&credentials);
//!
//! for message in client.get_messages(MessageQuery::new().label("inbox").seen(false)).collect().await? {
//!     println!("{}: {}", message.from.map(|a| a.email).unwrap_or_default(), message.subject);
//! }
//!
//! let mut watcher = Watcher::new(client, WatcherConfig::default())
//!     .add_handler(Handler::message_added(|event| {
//!         println!("new message {}", event.message_id);
//!         Ok(())
//!     }));
//! watcher.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod error;
pub mod gmail;
pub mod watch;

pub use auth::{ClientSecrets, Credentials, Session, scope};
pub use error::{Error, Result};
pub use gmail::{
    GmailClient, Label, Message, MessageQuery, NewLabel, SendMessage, Thread,
};
pub use watch::{Handler, HistoryEvent, HistoryType, Watcher, WatcherConfig};
