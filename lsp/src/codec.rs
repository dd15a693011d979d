//! JSON-RPC framing over the formatter's stdio.
//!
//! Every message is `Content-Length: N\r\n\r\n{json}`. [`FrameReader`] and
//! [`FrameWriter`] read and write one message at a time.

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Upper bound on a single message body (4 MiB).
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Outcome of parsing one header line.
#[derive(Debug, PartialEq, Eq)]
enum HeaderLine {
    /// Blank separator between headers and body.
    End,
    ContentLength(usize),
    /// Any other header (e.g. `Content-Type`), ignored.
    Other,
}

fn parse_header_line(line: &str) -> Result<HeaderLine> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(HeaderLine::End);
    }
    let Some((key, value)) = line.split_once(':') else {
        return Ok(HeaderLine::Other);
    };
    if !key.trim().eq_ignore_ascii_case("Content-Length") {
        return Ok(HeaderLine::Other);
    }
    let len = value
        .trim()
        .parse()
        .with_context(|| format!("invalid Content-Length value {:?}", value.trim()))?;
    Ok(HeaderLine::ContentLength(len))
}

pub struct FrameReader<R> {
    inner: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            line: String::new(),
        }
    }

    /// Read the next message.
    ///
    /// `Ok(None)` means the stream ended cleanly between messages. EOF inside
    /// a header block or body is an error.
    pub async fn read_frame(&mut self) -> Result<Option<serde_json::Value>> {
        let mut content_length = None;
        let mut started = false;

        loop {
            self.line.clear();
            let n = self
                .inner
                .read_line(&mut self.line)
                .await
                .context("reading header line")?;
            if n == 0 {
                if started {
                    bail!("unexpected EOF while reading headers");
                }
                return Ok(None);
            }
            started = true;

            match parse_header_line(&self.line)? {
                HeaderLine::End => break,
                HeaderLine::ContentLength(len) => content_length = Some(len),
                HeaderLine::Other => {}
            }
        }

        let Some(len) = content_length else {
            bail!("missing Content-Length header");
        };
        if len > MAX_BODY_BYTES {
            bail!("Content-Length {len} exceeds maximum {MAX_BODY_BYTES}");
        }

        let mut body = vec![0u8; len];
        self.inner
            .read_exact(&mut body)
            .await
            .context("reading frame body")?;
        let value = serde_json::from_slice(&body).context("parsing JSON-RPC frame")?;
        Ok(Some(value))
    }
}

pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }

    pub async fn write_frame(&mut self, msg: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_vec(msg).context("serializing JSON-RPC frame")?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.inner
            .write_all(header.as_bytes())
            .await
            .context("writing frame header")?;
        self.inner
            .write_all(&body)
            .await
            .context("writing frame body")?;
        self.inner.flush().await.context("flushing frame")?;
        Ok(())
    }
}
