use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::data::Pop3Error;

/// Reads one LF-terminated line of at most `line_limit` bytes (0 means no
/// limit), with the line ending stripped.
///
/// A longer line is consumed up to its LF and reported as
/// [`Pop3Error::LineTooLong`], so the next call starts on a fresh line.
/// Returns `Ok(None)` on end of stream; a partial line without LF at end of
/// stream is dropped.
pub async fn read_limited_line<R: AsyncBufRead + Unpin>(
    r: &mut R,
    line_limit: usize,
) -> Result<Option<String>, Pop3Error> {
    let mut line = Vec::new();
    let mut too_long = false;

    loop {
        let buf = r.fill_buf().await?;
        if buf.is_empty() {
            return Ok(None);
        }

        let (n, done) = match buf.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (buf.len(), false),
        };

        if !too_long {
            if line_limit > 0 && line.len() + n > line_limit {
                too_long = true;
                line.clear();
            } else {
                line.extend_from_slice(&buf[..n]);
            }
        }
        r.consume(n);

        if done {
            break;
        }
    }

    if too_long {
        return Err(Pop3Error::LineTooLong);
    }

    let line = String::from_utf8_lossy(&line);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn splits_lines() {
        let mut input: &[u8] = b"USER alice\r\nPASS secret\nQUIT";

        assert_eq!(
            read_limited_line(&mut input, 0).await.unwrap().as_deref(),
            Some("USER alice")
        );
        assert_eq!(
            read_limited_line(&mut input, 0).await.unwrap().as_deref(),
            Some("PASS secret")
        );
        assert_eq!(read_limited_line(&mut input, 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn long_line_is_skipped() {
        let mut input: &[u8] = b"0123456789abcdef\r\nNOOP\r\n";

        let err = read_limited_line(&mut input, 8).await.unwrap_err();
        assert!(matches!(err, Pop3Error::LineTooLong));
        assert_eq!(
            read_limited_line(&mut input, 8).await.unwrap().as_deref(),
            Some("NOOP")
        );
    }

    #[tokio::test]
    async fn limit_counts_line_ending() {
        let mut input: &[u8] = b"NOOP\r\n";
        assert_eq!(
            read_limited_line(&mut input, 6).await.unwrap().as_deref(),
            Some("NOOP")
        );

        let mut input: &[u8] = b"NOOP\r\n";
        assert!(read_limited_line(&mut input, 5).await.is_err());
    }
}
