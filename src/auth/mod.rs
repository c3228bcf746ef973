//! OAuth sessions: client secrets, consent flows and token persistence.

pub mod oauth;
pub mod secrets;
pub mod session;

pub use oauth::{Credentials, PendingAuth};
pub use secrets::{ClientSecrets, scope};
pub use session::{Session, UrlFlow};
