use std::fmt;
use std::io;

use thiserror::Error;

pub const ERR_AUTHENTICATION_ONLY: &str = "Only allowed in authentication mode";
pub const ERR_TRANSACTION_ONLY: &str = "Only allowed in transaction mode";
pub const ERR_INVALID_ID: &str = "Invalid message ID";

#[derive(Debug, Error)]
pub enum Pop3Error {
    #[error("pop3: too long a line in input stream")]
    LineTooLong,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Extended response codes (RFC 2449, RFC 3206) placed in brackets after
/// `-ERR`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    Auth,
    InUse,
    Sys,
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            ResponseCode::Auth => "AUTH",
            ResponseCode::InUse => "IN-USE",
            ResponseCode::Sys => "SYS",
        };
        write!(f, "[{}]", code)
    }
}
