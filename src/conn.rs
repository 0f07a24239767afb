use std::fmt::Display;
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::backend::{Backend, MessageStore};
use crate::capability::Capabilities;
use crate::data::{ResponseCode, ERR_INVALID_ID, ERR_TRANSACTION_ONLY};
use crate::parse::{parse_cmd, parse_msg_id, parse_opt_msg_id};
use crate::registry::Lock;
use crate::sasl::AuthAttempt;
use crate::server::Server;
use crate::stream::Stream;

/// Protocol state of a connection (RFC 1939 section 3). A connection only
/// ever moves forward through these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    Authentication,
    Transaction,
    Update,
}

/// Mailbox of a logged in user together with its registry entry.
pub(crate) struct Login<S> {
    pub user: String,
    pub store: S,
    pub _lock: Lock,
}

/// One client session.
pub struct Conn<B: Backend, T> {
    pub(crate) stream: Stream<T>,
    id: u64,
    started: u128,

    pub(crate) state: State,
    pub(crate) user: Option<String>,
    caps: Capabilities,

    pub(crate) auth: Option<AuthAttempt>,
    pub(crate) login: Option<Login<B::S>>,
}

impl<B: Backend, T: AsyncRead + AsyncWrite + Unpin + Send> Conn<B, T> {
    pub fn new(stream: T, id: u64, caps: Capabilities, max_line_length: usize) -> Self {
        let started = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        Conn {
            stream: Stream::new(stream, max_line_length),
            id,
            started,

            state: State::Authentication,
            user: None,
            caps,

            auth: None,
            login: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// User claimed with USER, or the logged in user.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// `<sequence>.<milliseconds>`, unique per connection.
    pub fn token(&self) -> String {
        format!("{}.{}", self.id, self.started)
    }

    /// The `<token@domain>` string of the greeting, used as APOP salt and
    /// CRAM-MD5 challenge.
    pub fn salt(&self, domain: &str) -> String {
        format!("<{}@{}>", self.token(), domain)
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Adds a capability for this connection only.
    pub fn add_capability(&mut self, state: State, cap: impl Into<String>) {
        self.caps.push(state, cap);
    }

    pub async fn greet(&mut self, server: &Server<B>) -> io::Result<()> {
        let greeting = format!("{} {}", server.banner, self.salt(&server.domain));
        self.stream.ok(&greeting).await
    }

    pub async fn handle(&mut self, line: &str, server: &Server<B>) -> io::Result<()> {
        // Mid-exchange, every line belongs to the mechanism
        if self.auth.is_some() {
            debug!("[{}] C: <auth continuation>", self.id);
            return self.handle_auth_next(line.trim(), server).await;
        }

        let (cmd, arg) = match parse_cmd(line) {
            Some(cmd) => cmd,
            None => return self.stream.err(None, "").await,
        };

        if cmd == "PASS" {
            debug!("[{}] C: PASS ****", self.id);
        } else {
            debug!("[{}] C: {} {}", self.id, cmd, arg);
        }

        match cmd.as_str() {
            "CAPA" => self.handle_capa(&arg, server).await,
            "QUIT" => self.handle_quit().await,
            "AUTH" => self.handle_auth(&arg, server).await,
            "APOP" => self.handle_apop(&arg, server).await,
            "USER" => self.handle_user(&arg).await,
            "PASS" => self.handle_pass(&arg, server).await,
            "NOOP" | "STAT" | "LIST" | "UIDL" | "RETR" | "DELE" | "RSET" => {
                self.handle_transaction(&cmd, &arg).await
            }
            _ => self.stream.err(None, "").await,
        }
    }

    pub async fn handle_capa(&mut self, arg: &str, server: &Server<B>) -> io::Result<()> {
        if !arg.is_empty() {
            return self.stream.err(None, "Try: CAPA").await;
        }

        let mut lines = self.caps.get(self.state).to_vec();
        if self.state == State::Authentication {
            let names = server.mechanisms();
            if !names.is_empty() {
                lines.push(format!("SASL {}", names.join(" ")));
            }
        }

        self.stream.multiline("Capability list follows", &lines).await
    }

    /// Commits deletions when leaving TRANSACTION, then closes.
    pub async fn handle_quit(&mut self) -> io::Result<()> {
        let mut committed = true;
        if let Some(mut login) = self.login.take() {
            self.state = State::Update;
            if let Err(err) = login.store.remove_deleted().await {
                warn!("[{}] removing deleted messages of {} failed: {}", self.id, login.user, err);
                committed = false;
            }
            info!("[{}] {} logged out", self.id, login.user);
        }

        let res = if committed {
            self.stream.ok("POP3 Server signing off").await
        } else {
            self.stream
                .err(Some(ResponseCode::Sys), "Some deleted messages not removed")
                .await
        };
        self.close().await;
        res
    }

    /// Ends the session without committing anything. Used for QUIT after
    /// the commit, idle timeouts and broken connections.
    pub async fn close(&mut self) {
        self.state = State::Update;
        self.auth = None;
        if let Some(login) = self.login.take() {
            debug!("[{}] dropping session of {}", self.id, login.user);
        }

        if let Err(err) = self.stream.shutdown().await {
            debug!("[{}] error closing connection: {}", self.id, err);
        }
    }

    async fn handle_transaction(&mut self, cmd: &str, arg: &str) -> io::Result<()> {
        let login = match self.login.as_mut() {
            Some(login) if self.state == State::Transaction => login,
            _ => return self.stream.err(None, ERR_TRANSACTION_ONLY).await,
        };
        let Login { user, store, .. } = login;
        let stream = &mut self.stream;
        let id = self.id;

        match cmd {
            "NOOP" => stream.ok("").await,
            "STAT" => match store.stat().await {
                Ok((count, size)) => stream.ok(&format!("{} {}", count, size)).await,
                Err(err) => {
                    warn!("[{}] STAT for {} failed: {}", id, user, err);
                    stream.err(None, "STAT failed").await
                }
            },
            "LIST" => {
                let msg = match parse_opt_msg_id(arg) {
                    Ok(msg) => msg,
                    Err(()) => return stream.err(None, ERR_INVALID_ID).await,
                };
                match store.list(msg).await {
                    Ok(entries) => write_listing(stream, msg, &entries).await,
                    Err(err) => {
                        warn!("[{}] LIST for {} failed: {}", id, user, err);
                        stream.err(None, "LIST command failed").await
                    }
                }
            }
            "UIDL" => {
                let msg = match parse_opt_msg_id(arg) {
                    Ok(msg) => msg,
                    Err(()) => return stream.err(None, ERR_INVALID_ID).await,
                };
                match store.uidl(msg).await {
                    Ok(entries) => write_listing(stream, msg, &entries).await,
                    Err(err) => {
                        warn!("[{}] UIDL for {} failed: {}", id, user, err);
                        stream.err(None, "UIDL command failed").await
                    }
                }
            }
            "RETR" => {
                let msg = match parse_msg_id(arg) {
                    Some(msg) => msg,
                    None => return stream.err(None, ERR_INVALID_ID).await,
                };
                match store.retr(msg).await {
                    Ok(Some(body)) => stream.body(&format!("{} octets", body.len()), &body).await,
                    Ok(None) => stream.err(None, ERR_INVALID_ID).await,
                    Err(err) => {
                        warn!("[{}] RETR {} for {} failed: {}", id, msg, user, err);
                        stream.err(None, "RETR command failed").await
                    }
                }
            }
            "DELE" => {
                let msg = match parse_msg_id(arg) {
                    Some(msg) => msg,
                    None => return stream.err(None, ERR_INVALID_ID).await,
                };
                match store.dele(msg).await {
                    Ok(true) => stream.ok("msg deleted").await,
                    Ok(false) => stream.err(None, ERR_INVALID_ID).await,
                    Err(err) => {
                        warn!("[{}] DELE {} for {} failed: {}", id, msg, user, err);
                        stream.err(None, "DELE command failed").await
                    }
                }
            }
            "RSET" => match store.rset().await {
                Ok(()) => stream.ok("").await,
                Err(err) => {
                    warn!("[{}] RSET for {} failed: {}", id, user, err);
                    stream.err(None, "RSET command failed").await
                }
            },
            _ => stream.err(None, "").await,
        }
    }
}

/// A single `+OK` line when a message number was given, the full listing
/// otherwise.
async fn write_listing<T, E>(stream: &mut Stream<T>, msg: Option<usize>, entries: &[E]) -> io::Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
    E: Display,
{
    if msg.is_some() {
        return match entries.first() {
            Some(entry) => stream.ok(&entry.to_string()).await,
            None => stream.err(None, ERR_INVALID_ID).await,
        };
    }

    let lines = entries.iter().map(|e| e.to_string()).collect::<Vec<_>>();
    stream.multiline("", &lines).await
}
