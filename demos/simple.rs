use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use rs_pop3::backend::{AuthStore, Backend, ListEntry, MessageStore, PasswordCheck, UidlEntry};
use rs_pop3::server::Server;

struct MyBackend {
    passwords: HashMap<String, String>,
}

struct MyStore {
    messages: Vec<Option<Vec<u8>>>,
    deleted: Vec<usize>,
}

#[async_trait]
impl AuthStore for MyBackend {
    async fn verify(&self, user: &str, check: &PasswordCheck<'_>) -> bool {
        match self.passwords.get(user) {
            Some(password) => check(password),
            None => false,
        }
    }
}

#[async_trait]
impl Backend for MyBackend {
    type S = MyStore;

    async fn new_store(&self, user: &str) -> Result<MyStore> {
        if !self.passwords.contains_key(user) {
            return Err(anyhow!("no mailbox for {}", user));
        }

        let welcome = format!(
            "From: postmaster@localhost\r\nTo: {}@localhost\r\nSubject: Welcome\r\n\r\nHello {}!\r\n",
            user, user
        );
        Ok(MyStore {
            messages: vec![Some(welcome.into_bytes())],
            deleted: Vec::new(),
        })
    }
}

impl MyStore {
    fn get(&self, id: usize) -> Option<&Vec<u8>> {
        if self.deleted.contains(&id) {
            return None;
        }
        self.messages.get(id.checked_sub(1)?)?.as_ref()
    }

    fn ids(&self) -> Vec<usize> {
        (1..=self.messages.len()).filter(|id| self.get(*id).is_some()).collect()
    }
}

#[async_trait]
impl MessageStore for MyStore {
    async fn stat(&mut self) -> Result<(usize, usize)> {
        let ids = self.ids();
        let size = ids.iter().filter_map(|id| self.get(*id)).map(|m| m.len()).sum();
        Ok((ids.len(), size))
    }

    async fn list(&mut self, id: Option<usize>) -> Result<Vec<ListEntry>> {
        Ok(self
            .ids()
            .into_iter()
            .filter(|i| id.map_or(true, |id| id == *i))
            .filter_map(|i| self.get(i).map(|m| ListEntry { id: i, size: m.len() }))
            .collect())
    }

    async fn uidl(&mut self, id: Option<usize>) -> Result<Vec<UidlEntry>> {
        Ok(self
            .ids()
            .into_iter()
            .filter(|i| id.map_or(true, |id| id == *i))
            .map(|i| UidlEntry {
                id: i,
                uid: format!("msg-{}", i),
            })
            .collect())
    }

    async fn retr(&mut self, id: usize) -> Result<Option<Vec<u8>>> {
        Ok(self.get(id).cloned())
    }

    async fn dele(&mut self, id: usize) -> Result<bool> {
        if self.get(id).is_none() {
            return Ok(false);
        }
        self.deleted.push(id);
        Ok(true)
    }

    async fn rset(&mut self) -> Result<()> {
        self.deleted.clear();
        Ok(())
    }

    async fn remove_deleted(&mut self) -> Result<()> {
        for id in self.deleted.drain(..) {
            println!("removing message {}", id);
            self.messages[id - 1] = None;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut passwords = HashMap::new();
    passwords.insert("alice".to_string(), "secret".to_string());
    let be = MyBackend { passwords };

    let mut s = Server::new(be);

    s.addr = "127.0.0.1:1110".to_string();
    s.domain = "localhost".to_string();
    s.idle_timeout = std::time::Duration::from_secs(60);
    s.max_line_length = 1024;

    println!("Starting server on {}", s.addr);
    match s.listen_and_serve().await {
        Ok(_) => println!("Server stopped"),
        Err(e) => println!("Server error: {}", e),
    }

    Ok(())
}
