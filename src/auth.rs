use std::io;
use std::sync::Arc;

use log::{info, warn};
use md5::{Digest, Md5};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::backend::Backend;
use crate::conn::{Conn, Login, State};
use crate::data::{ResponseCode, ERR_AUTHENTICATION_ONLY};
use crate::sasl::{AuthAttempt, AuthContext, Mechanism, Step};
use crate::server::Server;

/// APOP digest (RFC 1939 section 7): lowercase hex MD5 of the greeting's
/// `<token@domain>` string followed by the password.
pub fn apop_digest(salt: &str, password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl<B: Backend, T: AsyncRead + AsyncWrite + Unpin + Send> Conn<B, T> {
    pub async fn handle_user(&mut self, arg: &str) -> io::Result<()> {
        if self.state != State::Authentication {
            return self.stream.err(None, ERR_AUTHENTICATION_ONLY).await;
        }

        let user = arg.trim();
        if user.is_empty() {
            self.user = None;
            return self
                .stream
                .err(None, "User not set, try: USER <username>")
                .await;
        }

        self.user = Some(user.to_string());
        self.stream.ok("User accepted").await
    }

    pub async fn handle_pass(&mut self, arg: &str, server: &Server<B>) -> io::Result<()> {
        if self.state != State::Authentication {
            return self.stream.err(None, ERR_AUTHENTICATION_ONLY).await;
        }
        let user = match self.user.clone() {
            Some(user) => user,
            None => return self.stream.err(None, "USER not yet set").await,
        };

        let password = arg;
        if !server
            .backend
            .verify(&user, &|candidate: &str| candidate == password)
            .await
        {
            info!("[{}] invalid login for {}", self.id(), user);
            self.user = None;
            return self
                .stream
                .err(Some(ResponseCode::Auth), "Invalid login")
                .await;
        }

        self.finish_login(user, server).await
    }

    pub async fn handle_apop(&mut self, arg: &str, server: &Server<B>) -> io::Result<()> {
        if self.state != State::Authentication {
            return self.stream.err(None, ERR_AUTHENTICATION_ONLY).await;
        }

        let mut parts = arg.split_whitespace();
        let (user, digest) = match (parts.next(), parts.next()) {
            (Some(user), Some(digest)) => (user.to_string(), digest.to_ascii_lowercase()),
            _ => {
                return self
                    .stream
                    .err(Some(ResponseCode::Auth), "Invalid login")
                    .await
            }
        };

        let salt = self.salt(&server.domain);
        let check = |password: &str| apop_digest(&salt, password) == digest;
        if !server.backend.verify(&user, &check).await {
            info!("[{}] invalid APOP login for {}", self.id(), user);
            return self
                .stream
                .err(Some(ResponseCode::Auth), "Invalid login")
                .await;
        }

        self.finish_login(user, server).await
    }

    pub async fn handle_auth(&mut self, arg: &str, server: &Server<B>) -> io::Result<()> {
        if self.state != State::Authentication {
            return self.stream.err(None, ERR_AUTHENTICATION_ONLY).await;
        }

        let arg = arg.trim();
        if arg.is_empty() {
            return self.stream.err(None, "Invalid authentication method").await;
        }

        let (name, params) = match arg.split_once(' ') {
            Some((name, params)) => (name, params.trim()),
            None => (arg, ""),
        };
        let name = name.trim().to_uppercase();
        // https://tools.ietf.org/html/rfc5034#section-4
        let params = if params == "=" { "" } else { params };

        let mechanism = match server.auths.get(&name) {
            Some(mechanism) => mechanism.clone(),
            None => {
                return self
                    .stream
                    .err(None, "Unrecognized authentication type")
                    .await
            }
        };

        self.auth_round(mechanism, AuthAttempt::new(name, params), server)
            .await
    }

    /// Feeds a continuation line to the pending exchange.
    pub async fn handle_auth_next(&mut self, line: &str, server: &Server<B>) -> io::Result<()> {
        let mut attempt = match self.auth.take() {
            Some(attempt) => attempt,
            None => return Ok(()),
        };
        if self.state != State::Authentication {
            return self.stream.err(None, ERR_AUTHENTICATION_ONLY).await;
        }

        // https://tools.ietf.org/html/rfc5034#section-4
        if line == "*" {
            return self
                .stream
                .err(Some(ResponseCode::Auth), "Authentication cancelled")
                .await;
        }

        let mechanism = match server.auths.get(&attempt.mechanism) {
            Some(mechanism) => mechanism.clone(),
            None => {
                return self
                    .stream
                    .err(Some(ResponseCode::Auth), "Invalid authentication")
                    .await
            }
        };

        attempt.waiting = false;
        attempt.params = line.to_string();
        self.auth_round(mechanism, attempt, server).await
    }

    async fn auth_round(
        &mut self,
        mechanism: Arc<dyn Mechanism>,
        mut attempt: AuthAttempt,
        server: &Server<B>,
    ) -> io::Result<()> {
        let salt = self.salt(&server.domain);
        let step = {
            let mut ctx = AuthContext::new(&mut attempt, &salt, &server.backend);
            mechanism.next(&mut ctx).await
        };

        match step {
            Step::Continue(prompt) => {
                attempt.waiting = true;
                attempt.history.push(attempt.params.clone());
                self.auth = Some(attempt);
                self.stream.print_line(&prompt).await
            }
            Step::Done => match attempt.user {
                Some(user) => self.finish_login(user, server).await,
                None => {
                    warn!(
                        "[{}] {} finished without a user",
                        self.id(),
                        attempt.mechanism
                    );
                    self.stream
                        .err(Some(ResponseCode::Auth), "Invalid authentication")
                        .await
                }
            },
            Step::Failed => {
                info!(
                    "[{}] {} authentication failed for {}",
                    self.id(),
                    attempt.mechanism,
                    attempt.user.as_deref().unwrap_or("<unknown>")
                );
                self.stream
                    .err(Some(ResponseCode::Auth), "Invalid authentication")
                    .await
            }
        }
    }

    /// Turns a successful authentication into a TRANSACTION session: takes
    /// the registry entry for `user`, then opens its mailbox.
    pub(crate) async fn finish_login(&mut self, user: String, server: &Server<B>) -> io::Result<()> {
        self.auth = None;

        let lock = match server.users.lock(&user) {
            Some(lock) => lock,
            None => {
                info!("[{}] {} already has a session", self.id(), user);
                self.user = None;
                return self
                    .stream
                    .err(
                        Some(ResponseCode::InUse),
                        "You already have a POP session running",
                    )
                    .await;
            }
        };

        match server.backend.new_store(&user).await {
            Ok(store) => {
                info!("[{}] {} logged in", self.id(), user);
                self.user = Some(user.clone());
                self.login = Some(Login {
                    user,
                    store,
                    _lock: lock,
                });
                self.state = State::Transaction;
                self.stream.ok("You are now logged in").await
            }
            Err(err) => {
                drop(lock);
                warn!("[{}] opening mailbox of {} failed: {}", self.id(), user, err);
                self.user = None;
                self.stream
                    .err(Some(ResponseCode::Sys), "Error with initializing")
                    .await
            }
        }
    }
}
