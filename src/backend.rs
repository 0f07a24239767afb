use std::fmt;

use async_trait::async_trait;

use anyhow::Result;

/// Predicate handed to [`AuthStore::verify`]. It is called with the stored
/// password of the user and reports whether the client proved knowledge of
/// it.
pub type PasswordCheck<'a> = dyn Fn(&str) -> bool + Send + Sync + 'a;

/// Verifies credentials for every authentication pathway (USER/PASS, APOP
/// and SASL mechanisms).
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Looks up `user` and returns whether `check` accepts its password.
    /// Unknown users must yield false.
    async fn verify(&self, user: &str, check: &PasswordCheck<'_>) -> bool;
}

/// The host side of the server. Besides verifying credentials it opens the
/// mailbox of a user once that user has logged in.
#[async_trait]
pub trait Backend: AuthStore + 'static + Sized {
    type S: MessageStore;

    async fn new_store(&self, user: &str) -> Result<Self::S>;
}

/// A `LIST` line: message number and size in octets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListEntry {
    pub id: usize,
    pub size: usize,
}

impl fmt::Display for ListEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.size)
    }
}

/// A `UIDL` line: message number and unique id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UidlEntry {
    pub id: usize,
    pub uid: String,
}

impl fmt::Display for UidlEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.uid)
    }
}

/// Mailbox of one logged in user. Message numbers are 1-based.
///
/// An `Err` means the store itself failed; an unknown (or deleted) message
/// is reported through an empty result instead.
#[async_trait]
pub trait MessageStore: Send {
    /// Number of messages and their total size in octets.
    async fn stat(&mut self) -> Result<(usize, usize)>;

    /// All messages when `id` is `None`, otherwise at most the one entry
    /// for `id`.
    async fn list(&mut self, id: Option<usize>) -> Result<Vec<ListEntry>>;

    /// Same as [`MessageStore::list`] with unique ids instead of sizes.
    async fn uidl(&mut self, id: Option<usize>) -> Result<Vec<UidlEntry>>;

    /// Raw message contents. Dot-stuffing is done by the server.
    async fn retr(&mut self, id: usize) -> Result<Option<Vec<u8>>>;

    /// Marks a message as deleted. Returns false for unknown messages.
    async fn dele(&mut self, id: usize) -> Result<bool>;

    /// Clears every deletion mark of this session.
    async fn rset(&mut self) -> Result<()>;

    /// Physically removes the messages marked as deleted. Only called when
    /// the client ends the session with QUIT.
    async fn remove_deleted(&mut self) -> Result<()>;
}
