use crate::backend::Backend;
use crate::capability::Capabilities;
use crate::conn::{Conn, State};
use crate::data::Pop3Error;
use crate::parse::parse_cmd;
use crate::registry::Registry;
use crate::sasl::{self, Mechanism};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use log::{debug, error, info, warn};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::time::{timeout_at, Instant};

pub struct Server<B: Backend> {
    pub addr: String,

    /// Used in the greeting token and as APOP salt domain.
    pub domain: String,
    pub banner: String,

    /// Connections without a complete command for this long are dropped.
    pub idle_timeout: Duration,
    pub max_line_length: usize,

    pub backend: B,

    pub caps: Capabilities,
    pub auths: HashMap<String, Arc<dyn Mechanism>>,

    pub(crate) users: Arc<Registry>,
    counter: AtomicU64,
}

impl<B: Backend> Server<B> {
    pub fn new(be: B) -> Self {
        let mut s = Server {
            addr: String::new(),
            domain: "localhost".to_string(),
            banner: "POP3 Server ready".to_string(),
            idle_timeout: Duration::from_secs(10 * 60),
            max_line_length: 4096,
            backend: be,
            caps: Capabilities::default(),
            auths: HashMap::new(),
            users: Registry::new(),
            counter: AtomicU64::new(0),
        };

        s.register_mechanism(sasl::PLAIN, sasl::PlainMechanism);
        s.register_mechanism(sasl::CRAM_MD5, sasl::CramMd5Mechanism);
        s
    }

    /// Adds (or replaces) a SASL mechanism offered through `AUTH`.
    pub fn register_mechanism(&mut self, name: &str, mechanism: impl Mechanism + 'static) {
        self.auths
            .insert(name.trim().to_uppercase(), Arc::new(mechanism));
    }

    /// Registered mechanism names, sorted.
    pub fn mechanisms(&self) -> Vec<&str> {
        let mut names = self.auths.keys().map(|k| k.as_str()).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    /// Whether `user` currently has a session in the TRANSACTION state.
    pub fn is_connected(&self, user: &str) -> bool {
        self.users.is_locked(user)
    }

    pub fn connected_users(&self) -> usize {
        self.users.len()
    }

    pub fn new_conn<T>(&self, stream: T) -> Conn<B, T>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let id = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        Conn::new(stream, id, self.caps.clone(), self.max_line_length)
    }

    pub async fn serve(self, l: TcpListener) -> Result<()> {
        let server = Arc::new(self);
        loop {
            match l.accept().await {
                Ok((conn, peer)) => {
                    let server = server.clone();
                    tokio::spawn(async move {
                        let c = server.new_conn(conn);
                        debug!("[{}] connection from {}", c.id(), peer);
                        if let Err(err) = server.handle_conn(c).await {
                            warn!("connection from {} failed: {}", peer, err);
                        }
                    });
                }
                Err(e) => {
                    error!("accept failed: {}", e);
                }
            }
        }
    }

    /// Runs a session until the client quits, goes idle, or disconnects.
    pub async fn handle_conn<T>(&self, mut c: Conn<B, T>) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        if let Err(err) = c.greet(self).await {
            c.close().await;
            return Err(err.into());
        }

        // Only lines that parse as a command (or continue an AUTH exchange)
        // push the deadline back.
        let mut deadline = Instant::now() + self.idle_timeout;
        loop {
            let read = timeout_at(deadline, c.stream.read_line()).await;
            let line = match read {
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => {
                    debug!("[{}] connection closed by peer", c.id());
                    c.close().await;
                    return Ok(());
                }
                Ok(Err(Pop3Error::LineTooLong)) => {
                    if let Err(err) = c.stream.err(None, "Line too long").await {
                        c.close().await;
                        return Err(err.into());
                    }
                    continue;
                }
                Ok(Err(err)) => {
                    c.close().await;
                    return Err(err.into());
                }
                Err(_) => {
                    info!("[{}] idle timeout, closing", c.id());
                    c.close().await;
                    return Ok(());
                }
            };

            if c.auth.is_some() || parse_cmd(&line).is_some() {
                deadline = Instant::now() + self.idle_timeout;
            }

            if let Err(err) = c.handle(&line, self).await {
                c.close().await;
                return Err(err.into());
            }

            if c.state() == State::Update {
                return Ok(());
            }
        }
    }

    pub async fn listen_and_serve(self) -> Result<()> {
        let l = TcpListener::bind(&self.addr).await?;
        info!("listening on {}", self.addr);
        self.serve(l).await
    }
}
