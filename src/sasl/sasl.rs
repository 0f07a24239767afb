use async_trait::async_trait;

use crate::backend::{AuthStore, PasswordCheck};

/// Outcome of one authentication round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// The exchange succeeded for the user recorded by
    /// [`AuthContext::check`].
    Done,
    /// Send this line verbatim (usually `+ <base64>`) and hand the client's
    /// next line back to the mechanism.
    Continue(String),
    Failed,
}

/// State of one `AUTH` exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthAttempt {
    pub mechanism: String,
    /// True while the server waits for a continuation line.
    pub waiting: bool,
    /// Parameters of the current round.
    pub params: String,
    /// Parameters of every earlier round, oldest first.
    pub history: Vec<String>,
    /// User claimed so far.
    pub user: Option<String>,
}

impl AuthAttempt {
    pub fn new(mechanism: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            mechanism: mechanism.into(),
            params: params.into(),
            ..Default::default()
        }
    }
}

/// The secret a mechanism wants verified: either the password the client
/// sent, or a predicate that is run against the stored password.
pub enum Password<'a> {
    Literal(&'a str),
    Check(&'a PasswordCheck<'a>),
}

/// What a [`Mechanism`] sees during one round.
pub struct AuthContext<'a> {
    pub attempt: &'a mut AuthAttempt,
    /// `<token@domain>` of this connection, the same string APOP uses.
    pub salt: &'a str,
    store: &'a dyn AuthStore,
}

impl<'a> AuthContext<'a> {
    pub fn new(attempt: &'a mut AuthAttempt, salt: &'a str, store: &'a dyn AuthStore) -> Self {
        Self {
            attempt,
            salt,
            store,
        }
    }

    pub fn params(&self) -> &str {
        &self.attempt.params
    }

    /// Records `user` as the claimed identity and verifies `password`
    /// against the auth store.
    pub async fn check(&mut self, user: &str, password: Password<'_>) -> bool {
        let user = user.trim();
        if user.is_empty() {
            return false;
        }
        self.attempt.user = Some(user.to_string());

        match password {
            Password::Literal(password) => {
                self.store
                    .verify(user, &|candidate: &str| candidate == password)
                    .await
            }
            Password::Check(check) => self.store.verify(user, check).await,
        }
    }
}

/// A SASL mechanism usable with `AUTH`. One instance serves every
/// connection; per-exchange state lives in the [`AuthAttempt`].
#[async_trait]
pub trait Mechanism: Send + Sync {
    /// Runs one round. The first round carries the optional initial
    /// response of the `AUTH` command in `params`; later rounds carry the
    /// client's continuation lines.
    async fn next(&self, ctx: &mut AuthContext<'_>) -> Step;
}
