use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;
use crate::Document;

const DEFAULT_MAX_VALUE_BYTES: usize = 1024 * 1024;

/// Streaming JSON document decoder.
///
/// The input is logically one large JSON array of documents, but it arrives
/// as arbitrary byte chunks; values may cross chunk boundaries. NDJSON and
/// bare concatenated objects are accepted as well, since top-level `[`, `]`
/// and `,` are treated as framing and skipped between values.
///
/// A malformed fragment is a recoverable event: it is reported on stderr and
/// the decoder resynchronizes at the next top-level `{`. Only a well-formed
/// value exceeding the size cap fails the stage; an oversized junk run is
/// flushed in pieces and skipped like any other malformed fragment.
pub struct JsonDecoder {
    max_value_bytes: usize,
}

impl JsonDecoder {
    pub fn new() -> Self {
        Self {
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
        }
    }

    /// Maximum number of bytes allowed for a single document.
    pub fn max_value_bytes(mut self, n: usize) -> Self {
        self.max_value_bytes = n.max(2);
        self
    }
}

impl Default for JsonDecoder {
    fn default() -> Self {
        Self::new()
    }
}

enum ScanState {
    /// Between top-level values; framing bytes are skipped here.
    Between,
    /// Inside a top-level object, tracking brace depth and strings.
    InValue,
    /// Inside an unparseable run; resynchronizing at the next boundary.
    InJunk,
}

/// A complete top-level fragment sliced out of the byte stream.
enum Fragment {
    Value(Vec<u8>),
    Junk(Vec<u8>),
}

struct Scanner {
    state: ScanState,
    buf: Vec<u8>,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Scanner {
    fn new() -> Self {
        Self {
            state: ScanState::Between,
            buf: Vec::new(),
            depth: 0,
            in_string: false,
            escaped: false,
        }
    }

    fn feed(&mut self, byte: u8) -> Option<Fragment> {
        match self.state {
            ScanState::Between => match byte {
                b' ' | b'\t' | b'\r' | b'\n' | b',' | b'[' | b']' => None,
                b'{' => {
                    self.start_value(byte);
                    None
                }
                _ => {
                    self.state = ScanState::InJunk;
                    self.buf.push(byte);
                    None
                }
            },
            ScanState::InValue => {
                self.buf.push(byte);
                if self.in_string {
                    if self.escaped {
                        self.escaped = false;
                    } else if byte == b'\\' {
                        self.escaped = true;
                    } else if byte == b'"' {
                        self.in_string = false;
                    }
                    return None;
                }
                match byte {
                    b'"' => self.in_string = true,
                    b'{' | b'[' => self.depth += 1,
                    b'}' | b']' => {
                        self.depth -= 1;
                        if self.depth == 0 {
                            self.state = ScanState::Between;
                            return Some(Fragment::Value(std::mem::take(&mut self.buf)));
                        }
                    }
                    _ => {}
                }
                None
            }
            ScanState::InJunk => match byte {
                b' ' | b'\t' | b'\r' | b'\n' | b',' | b'[' | b']' => {
                    self.state = ScanState::Between;
                    Some(Fragment::Junk(std::mem::take(&mut self.buf)))
                }
                b'{' => {
                    let junk = std::mem::take(&mut self.buf);
                    self.start_value(byte);
                    Some(Fragment::Junk(junk))
                }
                _ => {
                    self.buf.push(byte);
                    None
                }
            },
        }
    }

    fn start_value(&mut self, byte: u8) {
        self.state = ScanState::InValue;
        self.depth = 1;
        self.in_string = false;
        self.escaped = false;
        self.buf.push(byte);
    }

    /// Whatever is left in the buffer once the input ends.
    fn finish(&mut self) -> Option<Fragment> {
        if self.buf.is_empty() {
            return None;
        }
        match self.state {
            ScanState::Between => None,
            ScanState::InValue | ScanState::InJunk => {
                self.state = ScanState::Between;
                Some(Fragment::Junk(std::mem::take(&mut self.buf)))
            }
        }
    }
}

enum EmitOutcome {
    Continue,
    Stop,
}

impl JsonDecoder {
    async fn emit_fragment(
        &self,
        fragment: Fragment,
        output: &Sender<Document>,
        cancel: &CancelToken,
    ) -> Result<EmitOutcome> {
        let raw = match fragment {
            Fragment::Value(raw) => raw,
            Fragment::Junk(raw) => {
                eprintln!(
                    "decode error: skipping malformed fragment ({} bytes, preview: {:?})",
                    raw.len(),
                    preview(&raw)
                );
                return Ok(EmitOutcome::Continue);
            }
        };

        let doc = match serde_json::from_slice::<Document>(&raw) {
            Ok(doc) => doc,
            Err(err) => {
                eprintln!(
                    "decode error: {} ({} bytes, preview: {:?})",
                    err,
                    raw.len(),
                    preview(&raw)
                );
                return Ok(EmitOutcome::Continue);
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Ok(EmitOutcome::Stop),
            sent = output.send(doc) => {
                if sent.is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::INFO,
                        event = "bulkpipe.downstream.closed",
                        stage = "json_decoder",
                        "bulkpipe.downstream.closed"
                    );
                    Ok(EmitOutcome::Stop)
                } else {
                    Ok(EmitOutcome::Continue)
                }
            }
        }
    }
}

#[async_trait]
impl Pipe<Bytes, Document> for JsonDecoder {
    fn stage_name(&self) -> &'static str {
        "json_decoder"
    }

    async fn process(
        &self,
        mut input: Receiver<Bytes>,
        output: Sender<Document>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let mut scanner = Scanner::new();

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                msg = input.recv() => {
                    let Some(chunk) = msg else { break; };
                    chunk
                }
            };

            for &byte in chunk.iter() {
                if let Some(fragment) = scanner.feed(byte) {
                    match self.emit_fragment(fragment, &output, &cancel).await? {
                        EmitOutcome::Continue => {}
                        EmitOutcome::Stop => return Ok(()),
                    }
                }
                if scanner.buf.len() > self.max_value_bytes {
                    // An oversized junk run is still recoverable input; flush
                    // it in pieces and keep scanning. Only a well-formed value
                    // blowing the cap fails the stage.
                    if matches!(scanner.state, ScanState::InJunk) {
                        scanner.state = ScanState::Between;
                        let junk = Fragment::Junk(std::mem::take(&mut scanner.buf));
                        match self.emit_fragment(junk, &output, &cancel).await? {
                            EmitOutcome::Continue => {}
                            EmitOutcome::Stop => return Ok(()),
                        }
                        continue;
                    }
                    return Err(Error::stage(
                        "json_decoder",
                        format!(
                            "value exceeded max_value_bytes ({} > {})",
                            scanner.buf.len(),
                            self.max_value_bytes
                        ),
                    ));
                }
            }
        }

        // A truncated trailing value is reported, not fatal.
        if let Some(fragment) = scanner.finish() {
            let _ = self.emit_fragment(fragment, &output, &cancel).await?;
        }

        Ok(())
    }
}

fn preview(raw: &[u8]) -> String {
    const PREVIEW_LEN: usize = 80;
    let text = String::from_utf8_lossy(raw);
    let escaped = text.replace('\n', "\\n").replace('\r', "\\r");
    let mut short = escaped.chars().take(PREVIEW_LEN).collect::<String>();
    if escaped.chars().count() > PREVIEW_LEN {
        short.push_str("...");
    }
    short
}
