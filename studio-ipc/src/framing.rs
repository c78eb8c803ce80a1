//! Newline framing over a byte stream
//!
//! A single read may carry zero, one or several complete lines, and a line
//! may be split across reads. Only complete `\n`-terminated records are
//! handed out.

use bytes::BytesMut;
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::IpcError;

const READ_CHUNK: usize = 8 * 1024;

/// Accumulates bytes and yields complete lines
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: BytesMut,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(line) = self.next_line() {
            lines.push(line);
        }
        lines
    }

    /// Pop the next complete line, without its terminator
    pub fn next_line(&mut self) -> Option<String> {
        let newline = self.buffer.iter().position(|byte| *byte == b'\n')?;
        let record = self.buffer.split_to(newline + 1);
        let text = String::from_utf8_lossy(&record[..newline]);
        Some(text.trim_end_matches('\r').to_string())
    }

    /// Bytes held back waiting for a terminator
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}

/// Reads complete lines from an async byte stream
pub struct LineReader<R> {
    reader: R,
    framer: LineFramer,
}

impl<R> LineReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            framer: LineFramer::new(),
        }
    }

    /// Next complete line, or `None` at end of stream. A trailing record
    /// without a terminator is discarded.
    pub async fn next_line(&mut self) -> Result<Option<String>, IpcError> {
        loop {
            if let Some(line) = self.framer.next_line() {
                return Ok(Some(line));
            }

            self.framer.buffer.reserve(READ_CHUNK);
            let read = self.reader.read_buf(&mut self.framer.buffer).await?;
            if read == 0 {
                let leftover = self.framer.pending_bytes();
                if leftover > 0 {
                    debug!("Discarding {} bytes of unterminated output", leftover);
                }
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"{\"a\":1}\n{\"b\":2}\n{\"c\"");

        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
        assert_eq!(framer.pending_bytes(), 4);
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut framer = LineFramer::new();

        assert!(framer.push(b"{\"request_").is_empty());
        let lines = framer.push(b"id\":\"x\",\"result\":42}\n");

        assert_eq!(lines, vec![r#"{"request_id":"x","result":42}"#]);
        assert_eq!(framer.pending_bytes(), 0);
    }

    #[test]
    fn test_crlf_and_empty_chunks() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"").is_empty());
        assert_eq!(framer.push(b"ok\r\n"), vec!["ok"]);
    }

    #[tokio::test]
    async fn test_reader_reassembles_split_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"{\"request_")
            .read(b"id\":\"x\",\"result\":42}\n")
            .read(b"{\"request_id\":\"y\"}\n{\"request_id\":\"z\"}\n")
            .build();
        let mut reader = LineReader::new(mock);

        assert_eq!(
            reader.next_line().await.unwrap().as_deref(),
            Some(r#"{"request_id":"x","result":42}"#)
        );
        assert_eq!(
            reader.next_line().await.unwrap().as_deref(),
            Some(r#"{"request_id":"y"}"#)
        );
        assert_eq!(
            reader.next_line().await.unwrap().as_deref(),
            Some(r#"{"request_id":"z"}"#)
        );
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reader_drops_unterminated_tail() {
        let mock = tokio_test::io::Builder::new()
            .read(b"done\n{\"partial\"")
            .build();
        let mut reader = LineReader::new(mock);

        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("done"));
        assert_eq!(reader.next_line().await.unwrap(), None);
    }
}
