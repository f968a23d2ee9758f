//! Forwarding of child output pipes to the client channel.

use std::io;

use log::debug;
use termrelay_protocol::{RelayMessage, StreamKind};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

/// What one forwarder did before its stream closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardSummary {
    pub kind: StreamKind,
    /// Bytes read from the pipe.
    pub bytes: u64,
    /// Messages accepted by the sink.
    pub messages: u64,
    /// False if the sink closed before the stream did.
    pub sink_open: bool,
}

/// Read `stream` until end-of-stream, emitting one message per chunk of at
/// most `chunk_size` bytes.
///
/// Output is decoded as UTF-8, replacing invalid sequences. If the sink
/// closes, the stream is still drained (and discarded) so the child never
/// blocks on a full pipe.
pub async fn forward<R>(
    mut stream: R,
    kind: StreamKind,
    sink: mpsc::Sender<RelayMessage>,
    chunk_size: usize,
) -> ForwardSummary
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut decoder = ChunkDecoder::default();
    let mut summary = ForwardSummary {
        kind,
        bytes: 0,
        messages: 0,
        sink_open: true,
    };

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("{} read failed, treating as closed: {}", kind, e);
                break;
            }
        };
        summary.bytes += n as u64;

        let text = decoder.decode(&buf[..n]);
        emit(&sink, kind, text, &mut summary).await;
    }

    if let Some(rest) = decoder.finish() {
        emit(&sink, kind, rest, &mut summary).await;
    }

    debug!(
        "{} closed after {} bytes / {} messages",
        kind, summary.bytes, summary.messages
    );
    summary
}

async fn emit(
    sink: &mpsc::Sender<RelayMessage>,
    kind: StreamKind,
    text: String,
    summary: &mut ForwardSummary,
) {
    if text.is_empty() || !summary.sink_open {
        return;
    }
    if sink.send(RelayMessage::output(kind, text)).await.is_ok() {
        summary.messages += 1;
    } else {
        debug!("{} sink closed, discarding remaining output", kind);
        summary.sink_open = false;
    }
}

/// Lossy UTF-8 decoder that holds back a multi-byte sequence split across
/// two reads.
#[derive(Debug, Default)]
struct ChunkDecoder {
    pending: Vec<u8>,
}

impl ChunkDecoder {
    fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let split = self.pending.len() - incomplete_suffix_len(&self.pending);
        let text = String::from_utf8_lossy(&self.pending[..split]).into_owned();
        self.pending.drain(..split);
        text
    }

    /// Flush whatever is held back, replacing it if incomplete.
    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(text)
    }
}

/// Length of a trailing, not yet complete UTF-8 sequence (0..=3).
fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            // continuation byte, keep looking for the lead
            continue;
        }
        let needed = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => return 0,
        };
        return if needed > back { back } else { 0 };
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(input: &[u8], chunk_size: usize) -> (Vec<RelayMessage>, ForwardSummary) {
        let (tx, mut rx) = mpsc::channel(1024);
        let summary = forward(input, StreamKind::Stdout, tx, chunk_size).await;
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        (out, summary)
    }

    fn joined(messages: &[RelayMessage]) -> String {
        messages.iter().map(RelayMessage::payload).collect()
    }

    #[tokio::test]
    async fn test_chunks_preserve_order() {
        let input = b"abcdefghij";
        let (messages, summary) = collect(input, 4).await;
        assert_eq!(messages.len(), 3);
        assert_eq!(joined(&messages), "abcdefghij");
        assert!(messages.iter().all(|m| m.kind() == "stdout"));
        assert_eq!(summary.bytes, 10);
        assert_eq!(summary.messages, 3);
    }

    #[tokio::test]
    async fn test_empty_stream_emits_nothing() {
        let (messages, summary) = collect(b"", 1024).await;
        assert!(messages.is_empty());
        assert_eq!(summary.bytes, 0);
        assert!(summary.sink_open);
    }

    #[tokio::test]
    async fn test_invalid_bytes_are_replaced() {
        let (messages, _) = collect(b"ok \xff\xfe done", 1024).await;
        assert_eq!(joined(&messages), "ok \u{FFFD}\u{FFFD} done");
    }

    #[tokio::test]
    async fn test_split_multibyte_character_survives() {
        // "é" is two bytes; a chunk size of 3 splits it after "ab".
        let input = "abé!".as_bytes();
        let (messages, _) = collect(input, 3).await;
        assert_eq!(joined(&messages), "abé!");
        assert!(!joined(&messages).contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn test_truncated_tail_is_flushed_lossy() {
        let (messages, _) = collect(b"x\xe2\x82", 1024).await;
        assert_eq!(joined(&messages), "x\u{FFFD}");
    }

    #[tokio::test]
    async fn test_stderr_tag() {
        let (tx, mut rx) = mpsc::channel(8);
        forward(&b"bye\n"[..], StreamKind::Stderr, tx, 1024).await;
        assert_eq!(rx.recv().await, Some(RelayMessage::Stderr("bye\n".into())));
    }

    #[tokio::test]
    async fn test_closed_sink_still_drains() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let summary = forward(&[b'a'; 5000][..], StreamKind::Stdout, tx, 1024).await;
        assert_eq!(summary.bytes, 5000);
        assert_eq!(summary.messages, 0);
        assert!(!summary.sink_open);
    }

    #[test]
    fn test_incomplete_suffix_len() {
        assert_eq!(incomplete_suffix_len(b"abc"), 0);
        assert_eq!(incomplete_suffix_len("é".as_bytes()), 0);
        assert_eq!(incomplete_suffix_len(&[b'a', 0xC3]), 1);
        assert_eq!(incomplete_suffix_len(&[0xE2, 0x82]), 2);
        assert_eq!(incomplete_suffix_len(&[0xF0, 0x9F, 0x98]), 3);
        assert_eq!(incomplete_suffix_len(&[0xF0, 0x9F, 0x98, 0x80]), 0);
        assert_eq!(incomplete_suffix_len(&[0xFF]), 0);
    }
}
