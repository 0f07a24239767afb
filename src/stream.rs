use std::io;

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::data::{Pop3Error, ResponseCode};
use crate::lengthlimit_reader::read_limited_line;
use crate::textproto::writer::DotWriter;

const CRNL: [u8; 2] = [b'\r', b'\n'];

/// Buffered connection to one client.
pub struct Stream<T> {
    inner: BufReader<T>,
    line_limit: usize,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Stream<T> {
    pub fn new(inner: T, line_limit: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            line_limit,
        }
    }

    pub async fn read_line(&mut self) -> Result<Option<String>, Pop3Error> {
        read_limited_line(&mut self.inner, self.line_limit).await
    }

    pub async fn print_line(&mut self, line: &str) -> io::Result<()> {
        debug!("S: {}", line);
        let w = self.inner.get_mut();
        w.write_all(line.as_bytes()).await?;
        w.write_all(&CRNL).await?;
        w.flush().await
    }

    pub async fn ok(&mut self, text: &str) -> io::Result<()> {
        if text.is_empty() {
            self.print_line("+OK").await
        } else {
            self.print_line(&format!("+OK {}", text)).await
        }
    }

    pub async fn err(&mut self, code: Option<ResponseCode>, text: &str) -> io::Result<()> {
        let mut line = "-ERR".to_string();
        if let Some(code) = code {
            line.push(' ');
            line.push_str(&code.to_string());
        }
        if !text.is_empty() {
            line.push(' ');
            line.push_str(text);
        }
        self.print_line(&line).await
    }

    /// `+OK` status line, `lines`, then the terminating `.`.
    pub async fn multiline(&mut self, status: &str, lines: &[String]) -> io::Result<()> {
        self.ok(status).await?;
        debug!("S: <{} lines>", lines.len());

        let w = self.inner.get_mut();
        let mut dot = DotWriter::new(w);
        for line in lines {
            dot.write(line.as_bytes()).await?;
            dot.write(&CRNL).await?;
        }
        dot.close().await
    }

    /// `+OK` status line followed by a dot-stuffed message body.
    pub async fn body(&mut self, status: &str, body: &[u8]) -> io::Result<()> {
        self.ok(status).await?;
        debug!("S: <{} octets>", body.len());

        let w = self.inner.get_mut();
        let mut dot = DotWriter::new(w);
        dot.write(body).await?;
        dot.close().await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.get_mut().shutdown().await
    }
}
