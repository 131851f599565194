//! Connection sessions for quizroom.
//!
//! This crate answers two questions for every open connection:
//!
//! 1. **Who may run rooms?** Operators present a token during the
//!    handshake; an [`Authenticator`] turns it into an
//!    [`OperatorCapability`]. Nothing else can mint one.
//! 2. **Who is this connection playing as?** After a successful `Join`
//!    the connection is bound to one participant in one room
//!    ([`Role::Participant`]), and submissions are only accepted for that
//!    participant.
//!
//! ```text
//! Server handler (above)  ← asks "may this connection do X?"
//!     ↕
//! Session layer (this crate)  ← roles and capabilities per connection
//!     ↕
//! Transport / Protocol (below)  ← ConnectionId, RoomId, ParticipantId
//! ```

mod auth;
mod error;
mod manager;
mod session;

pub use auth::{Authenticator, OperatorCapability, SharedSecretAuthenticator};
pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{Role, Session, SessionConfig};
