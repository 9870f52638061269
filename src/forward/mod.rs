//! Stream forwarding: child stdout/stderr bytes -> lines -> broker publishes.
//!
//! Each stream is read chunk by chunk. A chunk is decoded, trailing whitespace is
//! trimmed and the rest is split on `'\n'`; every resulting line is published on the
//! stream's topic. Partial lines are not carried between chunks.
//!
//! Both streams are drained together by [`forward_streams`], so stderr output is
//! published live while stdout is still open.

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, warn};

/// Bytes requested per read.
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Fire-and-forget publishing capability. Implementations must not wait for
/// broker acknowledgment.
pub trait Publish {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError>;
}

/// A publish request the client refused to queue.
#[derive(Debug, thiserror::Error)]
#[error("publish to '{topic}' rejected: {reason}")]
pub struct PublishError {
    pub topic: String,
    pub reason: String,
}

/// Which child stream a session drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTag {
    Stdout,
    Stderr,
}

impl StreamTag {
    pub fn suffix(&self) -> &'static str {
        match self {
            StreamTag::Stdout => "/stdout",
            StreamTag::Stderr => "/stderr",
        }
    }

    /// Topic for this stream: the base topic, tagged only when streams are split.
    pub fn topic(&self, base: &str, split_streams: bool) -> String {
        if split_streams {
            format!("{base}{}", self.suffix())
        } else {
            base.to_string()
        }
    }
}

impl fmt::Display for StreamTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamTag::Stdout => "stdout",
            StreamTag::Stderr => "stderr",
        })
    }
}

/// Framing switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameOptions {
    /// Publish empty lines (including the one a whitespace-only chunk yields).
    pub keep_empty: bool,
}

/// Decode one chunk and split it into lines.
///
/// Splitting an empty (or all-whitespace) chunk yields a single empty line; the
/// caller decides whether to publish it.
pub fn frame_chunk(chunk: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(chunk)
        .trim_end()
        .split('\n')
        .map(str::to_string)
        .collect()
}

/// One child stream together with the topic its lines go to.
pub struct StreamSession<R> {
    pub tag: StreamTag,
    pub topic: String,
    pub reader: R,
}

impl<R: AsyncRead + Unpin> StreamSession<R> {
    pub fn new(tag: StreamTag, base_topic: &str, split_streams: bool, reader: R) -> Self {
        Self {
            tag,
            topic: tag.topic(base_topic, split_streams),
            reader,
        }
    }
}

/// Counters for a finished session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    pub chunks: u64,
    pub lines_published: u64,
    pub lines_skipped: u64,
    pub publish_failures: u64,
}

/// Read `session` until end-of-stream, publishing every framed line in order.
pub async fn drain<R, P>(
    mut session: StreamSession<R>,
    publisher: &P,
    opts: FrameOptions,
) -> io::Result<StreamStats>
where
    R: AsyncRead + Unpin,
    P: Publish + ?Sized,
{
    let mut stats = StreamStats::default();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    debug!(stream = %session.tag, topic = %session.topic, "Draining stream");

    loop {
        let n = match session.reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!(stream = %session.tag, error = %e, "Error reading from stream");
                return Err(io::Error::new(
                    e.kind(),
                    format!("reading child {}: {e}", session.tag),
                ));
            }
        };
        stats.chunks += 1;

        for line in frame_chunk(&buf[..n]) {
            if line.is_empty() && !opts.keep_empty {
                stats.lines_skipped += 1;
                continue;
            }
            debug!(stream = %session.tag, "{line}");
            match publisher.publish(&session.topic, &line) {
                Ok(()) => stats.lines_published += 1,
                Err(e) => {
                    stats.publish_failures += 1;
                    warn!(stream = %session.tag, error = %e, "Line dropped");
                }
            }
        }
    }

    debug!(
        stream = %session.tag,
        chunks = stats.chunks,
        published = stats.lines_published,
        skipped = stats.lines_skipped,
        failed = stats.publish_failures,
        "Stream ended"
    );
    Ok(stats)
}

/// Drain stdout and stderr concurrently until both end.
///
/// A missing stream counts as already ended. Returns per-stream stats, or the
/// first read error once both drains have finished.
pub async fn forward_streams<O, E, P>(
    stdout: Option<StreamSession<O>>,
    stderr: Option<StreamSession<E>>,
    publisher: &P,
    opts: FrameOptions,
) -> io::Result<(StreamStats, StreamStats)>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
    P: Publish + ?Sized,
{
    let out = async {
        match stdout {
            Some(s) => drain(s, publisher, opts).await,
            None => Ok(StreamStats::default()),
        }
    };
    let err = async {
        match stderr {
            Some(s) => drain(s, publisher, opts).await,
            None => Ok(StreamStats::default()),
        }
    };

    let (out, err) = tokio::join!(out, err);
    Ok((out?, err?))
}
