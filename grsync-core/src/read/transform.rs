use std::io::Read;

use crate::codec::StreamEncoder;
use crate::error::Result;

/// Size of each pull from the source when feeding the compressor.
pub const FEED_LEN: usize = 8192;

/// Result of one [`TransformReader::read_chunk`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(Vec<u8>),
    /// Logical end of data. Returned at most once.
    End,
    /// Every call after the stream has ended.
    Exhausted,
}

impl ReadOutcome {
    pub fn into_data(self) -> Option<Vec<u8>> {
        match self {
            ReadOutcome::Data(bytes) => Some(bytes),
            ReadOutcome::End | ReadOutcome::Exhausted => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Ended,
}

/// "Give me the next `n` bytes" over a byte source, optionally compressing
/// on the fly.
///
/// Without an encoder this is a passthrough that fills each chunk from the
/// source. With an encoder the source is pushed through it in
/// [`FEED_LEN`] pieces and the output accumulates until `n` bytes are ready
/// or the encoder has flushed its final frame.
pub struct TransformReader<R: Read> {
    src: R,
    encoder: Option<Box<dyn StreamEncoder>>,
    compressing: bool,
    pending: Vec<u8>,
    state: State,
}

impl<R: Read> TransformReader<R> {
    pub fn plain(src: R) -> Self {
        Self {
            src,
            encoder: None,
            compressing: false,
            pending: Vec::new(),
            state: State::Open,
        }
    }

    pub fn compressed(src: R, encoder: Box<dyn StreamEncoder>) -> Self {
        Self {
            src,
            encoder: Some(encoder),
            compressing: true,
            pending: Vec::new(),
            state: State::Open,
        }
    }

    pub fn read_chunk(&mut self, n: usize) -> Result<ReadOutcome> {
        if self.state == State::Ended {
            return Ok(ReadOutcome::Exhausted);
        }
        let n = n.max(1);
        if self.compressing {
            self.read_compressed(n)
        } else {
            self.read_plain(n)
        }
    }

    fn read_plain(&mut self, n: usize) -> Result<ReadOutcome> {
        let mut chunk = Vec::with_capacity(n.min(1 << 20));
        self.src.by_ref().take(n as u64).read_to_end(&mut chunk)?;
        if chunk.is_empty() {
            self.state = State::Ended;
            return Ok(ReadOutcome::End);
        }
        Ok(ReadOutcome::Data(chunk))
    }

    fn read_compressed(&mut self, n: usize) -> Result<ReadOutcome> {
        let mut feed = [0u8; FEED_LEN];
        while self.pending.len() < n {
            let Some(encoder) = self.encoder.as_mut() else {
                break; // already finished
            };
            let k = self.src.read(&mut feed)?;
            if k == 0 {
                if let Some(encoder) = self.encoder.take() {
                    encoder.finish(&mut self.pending)?;
                }
                break;
            }
            encoder.feed(&feed[..k], &mut self.pending)?;
        }

        if self.pending.len() >= n {
            let rest = self.pending.split_off(n);
            return Ok(ReadOutcome::Data(std::mem::replace(&mut self.pending, rest)));
        }

        // The encoder is done and fewer than `n` bytes remain: hand over the tail.
        self.state = State::Ended;
        if self.pending.is_empty() {
            Ok(ReadOutcome::End)
        } else {
            Ok(ReadOutcome::Data(std::mem::take(&mut self.pending)))
        }
    }
}
