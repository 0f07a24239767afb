use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use md5::Md5;

use crate::sasl::{AuthContext, Mechanism, Password, Step};

/// The CRAM-MD5 mechanism name.
pub const CRAM_MD5: &str = "CRAM-MD5";

/// RFC 2195. The challenge is the connection's `<token@domain>` string;
/// the client answers `username SP hex(HMAC-MD5(password, challenge))`.
pub struct CramMd5Mechanism;

/// Lowercase hex HMAC-MD5 of `challenge` keyed with `password`.
pub fn cram_md5_digest(password: &str, challenge: &str) -> Option<String> {
    let mut mac = Hmac::<Md5>::new_from_slice(password.as_bytes()).ok()?;
    mac.update(challenge.as_bytes());
    Some(format!("{:x}", mac.finalize().into_bytes()))
}

#[async_trait]
impl Mechanism for CramMd5Mechanism {
    async fn next(&self, ctx: &mut AuthContext<'_>) -> Step {
        if ctx.attempt.history.is_empty() {
            let challenge = general_purpose::STANDARD.encode(ctx.salt);
            return Step::Continue(format!("+ {}", challenge));
        }

        let response = match general_purpose::STANDARD
            .decode(ctx.params())
            .ok()
            .and_then(|r| String::from_utf8(r).ok())
        {
            Some(response) => response,
            None => return Step::Failed,
        };

        let (user, digest) = match response.trim().rsplit_once(' ') {
            Some((user, digest)) => (user.to_string(), digest.to_ascii_lowercase()),
            None => return Step::Failed,
        };

        let challenge = ctx.salt.to_string();
        let check = |password: &str| {
            cram_md5_digest(password, &challenge).map_or(false, |expected| expected == digest)
        };

        if ctx.check(&user, Password::Check(&check)).await {
            Step::Done
        } else {
            Step::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AuthStore, PasswordCheck};
    use crate::sasl::AuthAttempt;

    struct OneUser;

    #[async_trait]
    impl AuthStore for OneUser {
        async fn verify(&self, user: &str, check: &PasswordCheck<'_>) -> bool {
            user == "tim" && check("tanstaaftanstaaf")
        }
    }

    #[test]
    fn rfc2195_vector() {
        assert_eq!(
            cram_md5_digest(
                "tanstaaftanstaaf",
                "<1896.697170952@postoffice.reston.mci.net>"
            )
            .unwrap(),
            "b913a602c7eda7a495b4e6e7334d3890"
        );
    }

    #[tokio::test]
    async fn challenge_then_response() {
        let salt = "<1896.697170952@postoffice.reston.mci.net>";
        let mut attempt = AuthAttempt::new(CRAM_MD5, "");

        let step = CramMd5Mechanism
            .next(&mut AuthContext::new(&mut attempt, salt, &OneUser))
            .await;
        assert_eq!(
            step,
            Step::Continue(
                "+ PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+".to_string()
            )
        );

        attempt.history.push(String::new());
        attempt.params =
            "dGltIGI5MTNhNjAyYzdlZGE3YTQ5NWI0ZTZlNzMzNGQzODkw".to_string();
        let step = CramMd5Mechanism
            .next(&mut AuthContext::new(&mut attempt, salt, &OneUser))
            .await;
        assert_eq!(step, Step::Done);
        assert_eq!(attempt.user.as_deref(), Some("tim"));
    }

    #[tokio::test]
    async fn wrong_digest() {
        let salt = "<1.2@localhost>";
        let mut attempt = AuthAttempt::new(CRAM_MD5, "");
        attempt.history.push(String::new());
        attempt.params = general_purpose::STANDARD.encode("tim 00000000000000000000000000000000");

        let step = CramMd5Mechanism
            .next(&mut AuthContext::new(&mut attempt, salt, &OneUser))
            .await;
        assert_eq!(step, Step::Failed);
    }
}
