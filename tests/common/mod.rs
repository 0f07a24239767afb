#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use rs_pop3::backend::{AuthStore, Backend, ListEntry, MessageStore, PasswordCheck, UidlEntry};
use rs_pop3::server::Server;

#[derive(Default)]
pub struct Calls {
    pub remove_deleted: AtomicUsize,
    pub rset: AtomicUsize,
    pub removed: Mutex<Vec<String>>,
}

/// Users with passwords, and a fixed set of messages per user.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    pub users: HashMap<String, String>,
    pub messages: HashMap<String, Vec<(String, Vec<u8>)>>,
    pub broken: HashSet<String>,
    /// Users whose stores answer every call with an error.
    pub failing: HashSet<String>,
    pub calls: Arc<Calls>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let mut be = MemoryBackend::default();
        be.users.insert("alice".to_string(), "secret".to_string());
        be.users.insert("bob".to_string(), "hunter2".to_string());
        be.messages.insert(
            "alice".to_string(),
            vec![
                ("uid-1".to_string(), b"Subject: one\r\n\r\nhello\r\n".to_vec()),
                ("uid-2".to_string(), b"Subject: two\r\n\r\n.dotted\r\nbye\r\n".to_vec()),
            ],
        );
        be
    }
}

#[async_trait]
impl AuthStore for MemoryBackend {
    async fn verify(&self, user: &str, check: &PasswordCheck<'_>) -> bool {
        match self.users.get(&user.to_lowercase()) {
            Some(password) => check(password),
            None => false,
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    type S = MemoryStore;

    async fn new_store(&self, user: &str) -> Result<MemoryStore> {
        let user = user.to_lowercase();
        if self.broken.contains(&user) {
            return Err(anyhow!("mailbox of {} is unavailable", user));
        }

        Ok(MemoryStore {
            messages: self.messages.get(&user).cloned().unwrap_or_default(),
            deleted: HashSet::new(),
            failing: self.failing.contains(&user),
            calls: self.calls.clone(),
        })
    }
}

pub struct MemoryStore {
    messages: Vec<(String, Vec<u8>)>,
    deleted: HashSet<usize>,
    failing: bool,
    calls: Arc<Calls>,
}

impl MemoryStore {
    fn check(&self) -> Result<()> {
        if self.failing {
            return Err(anyhow!("store is offline"));
        }
        Ok(())
    }

    fn visible(&self) -> impl Iterator<Item = (usize, &(String, Vec<u8>))> {
        self.messages
            .iter()
            .enumerate()
            .map(|(i, m)| (i + 1, m))
            .filter(|(id, _)| !self.deleted.contains(id))
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn stat(&mut self) -> Result<(usize, usize)> {
        self.check()?;
        Ok(self
            .visible()
            .fold((0, 0), |(count, size), (_, m)| (count + 1, size + m.1.len())))
    }

    async fn list(&mut self, id: Option<usize>) -> Result<Vec<ListEntry>> {
        self.check()?;
        Ok(self
            .visible()
            .filter(|(i, _)| id.map_or(true, |id| id == *i))
            .map(|(i, m)| ListEntry { id: i, size: m.1.len() })
            .collect())
    }

    async fn uidl(&mut self, id: Option<usize>) -> Result<Vec<UidlEntry>> {
        self.check()?;
        Ok(self
            .visible()
            .filter(|(i, _)| id.map_or(true, |id| id == *i))
            .map(|(i, m)| UidlEntry { id: i, uid: m.0.clone() })
            .collect())
    }

    async fn retr(&mut self, id: usize) -> Result<Option<Vec<u8>>> {
        self.check()?;
        Ok(self
            .visible()
            .find(|(i, _)| *i == id)
            .map(|(_, m)| m.1.clone()))
    }

    async fn dele(&mut self, id: usize) -> Result<bool> {
        self.check()?;
        if id == 0 || id > self.messages.len() || self.deleted.contains(&id) {
            return Ok(false);
        }
        self.deleted.insert(id);
        Ok(true)
    }

    async fn rset(&mut self) -> Result<()> {
        self.check()?;
        self.calls.rset.fetch_add(1, Ordering::SeqCst);
        self.deleted.clear();
        Ok(())
    }

    async fn remove_deleted(&mut self) -> Result<()> {
        self.calls.remove_deleted.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let mut removed = self.calls.removed.lock().unwrap();
        for id in &self.deleted {
            removed.push(self.messages[id - 1].0.clone());
        }
        Ok(())
    }
}

/// Client end of a session running on a duplex pipe.
pub struct Client {
    r: BufReader<ReadHalf<DuplexStream>>,
    w: WriteHalf<DuplexStream>,
    pub greeting: String,
}

impl Client {
    /// Wraps the client end of a duplex pipe and reads the greeting.
    pub async fn new(stream: DuplexStream) -> Self {
        let (r, w) = io::split(stream);
        let mut client = Client {
            r: BufReader::new(r),
            w,
            greeting: String::new(),
        };
        client.greeting = client.line().await.expect("no greeting");
        client
    }

    pub async fn send(&mut self, line: &str) {
        self.w.write_all(line.as_bytes()).await.unwrap();
        self.w.write_all(b"\r\n").await.unwrap();
        self.w.flush().await.unwrap();
    }

    /// Next response line without CRLF, or `None` once the server closed
    /// the connection.
    pub async fn line(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = timeout(Duration::from_secs(5), self.r.read_line(&mut line))
            .await
            .expect("server did not answer")
            .unwrap();
        if n == 0 {
            return None;
        }
        Some(line.trim_end_matches("\r\n").to_string())
    }

    pub async fn cmd(&mut self, line: &str) -> String {
        self.send(line).await;
        self.line().await.expect("connection closed")
    }

    /// Like [`Client::cmd`], but `None` once the server is gone.
    pub async fn try_cmd(&mut self, line: &str) -> Option<String> {
        let sent = async {
            self.w.write_all(format!("{}\r\n", line).as_bytes()).await?;
            self.w.flush().await
        };
        if sent.await.is_err() {
            return None;
        }
        self.line().await
    }

    /// Lines of a multi-line body, up to (not including) the `.` line.
    pub async fn body(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = self.line().await.expect("connection closed");
            if line == "." {
                return lines;
            }
            lines.push(line);
        }
    }

    pub async fn login(&mut self, user: &str, password: &str) -> String {
        assert_eq!(self.cmd(&format!("USER {}", user)).await, "+OK User accepted");
        self.cmd(&format!("PASS {}", password)).await
    }

    /// `<token@domain>` from the greeting.
    pub fn salt(&self) -> String {
        let start = self.greeting.find('<').unwrap();
        self.greeting[start..].to_string()
    }
}

pub fn server(be: MemoryBackend) -> Arc<Server<MemoryBackend>> {
    let mut s = Server::new(be);
    s.domain = "node.ee".to_string();
    Arc::new(s)
}

pub async fn connect(server: &Arc<Server<MemoryBackend>>) -> (Client, JoinHandle<Result<()>>) {
    let (client, srv) = io::duplex(64 * 1024);

    let server = server.clone();
    let handle = tokio::spawn(async move {
        let c = server.new_conn(srv);
        server.handle_conn(c).await
    });

    (Client::new(client).await, handle)
}
