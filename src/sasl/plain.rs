use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};

use crate::sasl::{AuthContext, Mechanism, Password, Step};

/// The PLAIN mechanism name.
pub const PLAIN: &str = "PLAIN";

/// RFC 4616. The client sends `identity\0username\0password`, base64
/// encoded, either as initial response or after an empty challenge. If the
/// identity is not empty it has to match the username.
pub struct PlainMechanism;

#[async_trait]
impl Mechanism for PlainMechanism {
    async fn next(&self, ctx: &mut AuthContext<'_>) -> Step {
        if ctx.params().is_empty() {
            // No initial response, send an empty challenge
            if ctx.attempt.history.is_empty() {
                return Step::Continue("+ ".to_string());
            }
            return Step::Failed;
        }

        let response = match general_purpose::STANDARD.decode(ctx.params()) {
            Ok(response) => response,
            Err(_) => return Step::Failed,
        };

        let mut parts = response.split(|&b| b == b'\x00');
        let (identity, username, password) = match (parts.next(), parts.next(), parts.next()) {
            (Some(identity), Some(username), Some(password)) => (identity, username, password),
            _ => return Step::Failed,
        };
        if parts.next().is_some() {
            return Step::Failed;
        }

        let (identity, username, password) = match (
            std::str::from_utf8(identity),
            std::str::from_utf8(username),
            std::str::from_utf8(password),
        ) {
            (Ok(identity), Ok(username), Ok(password)) => (identity, username, password),
            _ => return Step::Failed,
        };

        if !identity.is_empty() && identity != username {
            return Step::Failed;
        }

        if ctx.check(username, Password::Literal(password)).await {
            Step::Done
        } else {
            Step::Failed
        }
    }
}
