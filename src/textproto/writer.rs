use tokio::io::{AsyncWrite, AsyncWriteExt};

const CRNL: [u8; 2] = [b'\r', b'\n'];
const DOTCRNL: [u8; 3] = [b'.', b'\r', b'\n'];

enum WState {
    Begin,
    BeginLine,
    CR,
    Data,
}

/// Writes the body of a multi-line response: lines starting with `.` get
/// an extra `.`, bare LF becomes CRLF, and [`DotWriter::close`] appends the
/// terminating `.` line.
pub struct DotWriter<'a, W: AsyncWrite + Unpin> {
    w: &'a mut W,
    state: WState,
}

impl<'a, W: AsyncWrite + Unpin> DotWriter<'a, W> {
    pub fn new(w: &'a mut W) -> Self {
        Self {
            w,
            state: WState::Begin,
        }
    }

    pub async fn write(&mut self, b: &[u8]) -> std::io::Result<usize> {
        let mut out = Vec::with_capacity(b.len() + b.len() / 32 + 2);

        for &c in b {
            match self.state {
                WState::Begin | WState::BeginLine => {
                    self.state = WState::Data;
                    match c {
                        b'.' => out.push(b'.'),
                        b'\r' => self.state = WState::CR,
                        b'\n' => {
                            out.push(b'\r');
                            self.state = WState::BeginLine;
                        }
                        _ => {}
                    }
                }
                WState::Data => match c {
                    b'\r' => self.state = WState::CR,
                    b'\n' => {
                        out.push(b'\r');
                        self.state = WState::BeginLine;
                    }
                    _ => {}
                },
                WState::CR => {
                    self.state = WState::Data;
                    if c == b'\n' {
                        self.state = WState::BeginLine;
                    }
                }
            }
            out.push(c);
        }

        self.w.write_all(&out).await?;
        Ok(b.len())
    }

    pub async fn close(self) -> std::io::Result<()> {
        match self.state {
            WState::CR => {
                self.w.write_all(b"\n").await?;
            }
            WState::Data => {
                self.w.write_all(&CRNL).await?;
            }
            WState::Begin | WState::BeginLine => {}
        }
        self.w.write_all(&DOTCRNL).await?;
        self.w.flush().await
    }
}
