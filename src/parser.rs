//! Incremental SSE field parser.
//!
//! Pure, allocation-light state machine that turns an arbitrarily chunked
//! byte stream into a sequence of [`Line`]s. It is purely syntactic: it does
//! not know what `data`/`event`/`id`/`retry` mean, that's [`crate::event`]'s job.

/// A parsed, non-blank line: either a comment or a named field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field name, or `"comment"` for a `:`-prefixed line.
    pub name: String,
    /// Raw field value, after leading-space stripping (for named fields).
    pub value: Vec<u8>,
}

/// One unit of parser output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A field line.
    Field(Field),
    /// A blank line: dispatch boundary.
    Dispatch,
}

const BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Incremental line/field splitter.
///
/// Carries `(line buffer, cr-pending, bom-probe)` across `feed()` calls so
/// fields — and the leading BOM itself — may straddle chunk boundaries
/// without the caller re-buffering the whole stream.
#[derive(Debug, Default)]
pub struct FieldParser {
    buffer: Vec<u8>,
    /// Bytes buffered while a leading BOM is still ambiguous (fewer than 3
    /// bytes seen so far and what's been seen is still a valid BOM prefix).
    /// Never holds more than 3 bytes.
    bom_probe: Vec<u8>,
    bom_done: bool,
    pending_cr: bool,
}

impl FieldParser {
    /// Creates a fresh parser with empty internal state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of bytes, invoking `emit` for each line produced.
    pub fn feed(&mut self, chunk: &[u8], mut emit: impl FnMut(Line)) {
        let mut chunk = chunk;
        if !self.bom_done {
            let take = (BOM.len() - self.bom_probe.len()).min(chunk.len());
            self.bom_probe.extend_from_slice(&chunk[..take]);
            chunk = &chunk[take..];

            if self.bom_probe.len() < BOM.len() && BOM.starts_with(&self.bom_probe) {
                // Still ambiguous: wait for more bytes before deciding.
                return;
            }
            self.bom_done = true;
            if self.bom_probe != BOM {
                // Not a BOM after all: replay the probed bytes as ordinary
                // stream content before continuing with the rest of `chunk`.
                let probe = std::mem::take(&mut self.bom_probe);
                self.process_bytes(&probe, &mut emit);
            }
        }
        self.process_bytes(chunk, &mut emit);
    }

    /// True if bytes have accumulated for a line that was never terminated,
    /// or for a leading BOM that was never resolved before the stream ended.
    /// Per the SSE streaming contract, such partial content is discarded,
    /// not surfaced as a field; the read loop uses this to classify a dirty
    /// EOF.
    pub fn has_partial_line(&self) -> bool {
        !self.buffer.is_empty() || (!self.bom_done && !self.bom_probe.is_empty())
    }

    fn process_bytes(&mut self, chunk: &[u8], emit: &mut impl FnMut(Line)) {
        for &byte in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\r' => {
                    self.flush_line(emit);
                    self.pending_cr = true;
                }
                b'\n' => self.flush_line(emit),
                _ => self.buffer.push(byte),
            }
        }
    }

    fn flush_line(&mut self, emit: &mut impl FnMut(Line)) {
        let line = std::mem::take(&mut self.buffer);
        if line.is_empty() {
            emit(Line::Dispatch);
            return;
        }
        emit(Line::Field(parse_field(&line)));
    }
}

fn parse_field(line: &[u8]) -> Field {
    if line[0] == b':' {
        return Field { name: "comment".to_string(), value: line[1..].to_vec() };
    }
    match line.iter().position(|&b| b == b':') {
        Some(colon) => {
            let name = String::from_utf8_lossy(&line[..colon]).into_owned();
            let mut value = &line[colon + 1..];
            if value.first() == Some(&b' ') {
                value = &value[1..];
            }
            Field { name, value: value.to_vec() }
        }
        None => Field { name: String::from_utf8_lossy(line).into_owned(), value: Vec::new() },
    }
}
