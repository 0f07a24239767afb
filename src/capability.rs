use crate::conn::State;

/// Capabilities listed by `CAPA`, one list per protocol state.
///
/// The server owns the prototype; every connection gets its own copy so
/// that additions made by one session never show up in another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capabilities {
    authentication: Vec<String>,
    transaction: Vec<String>,
    update: Vec<String>,
}

impl Capabilities {
    pub fn new() -> Self {
        Capabilities {
            authentication: Vec::new(),
            transaction: Vec::new(),
            update: Vec::new(),
        }
    }

    pub fn get(&self, state: State) -> &[String] {
        match state {
            State::Authentication => &self.authentication,
            State::Transaction => &self.transaction,
            State::Update => &self.update,
        }
    }

    pub fn push(&mut self, state: State, cap: impl Into<String>) {
        let list = match state {
            State::Authentication => &mut self.authentication,
            State::Transaction => &mut self.transaction,
            State::Update => &mut self.update,
        };
        list.push(cap.into());
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        let mut caps = Capabilities::new();
        for cap in ["UIDL", "USER", "RESP-CODES", "AUTH-RESP-CODE"] {
            caps.push(State::Authentication, cap);
        }
        for cap in [
            "UIDL",
            "EXPIRE NEVER",
            "LOGIN-DELAY 0",
            concat!("IMPLEMENTATION rs-pop3 ", env!("CARGO_PKG_VERSION")),
        ] {
            caps.push(State::Transaction, cap);
        }
        caps
    }
}
