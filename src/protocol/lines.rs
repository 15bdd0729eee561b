//! Reassembles newline-terminated lines from arbitrary serial read chunks.

/// Longest partial line kept while waiting for a newline. Anything longer is
/// line noise from a baud mismatch and gets dropped.
pub const MAX_LINE_LEN: usize = 1024;

/// Buffers input and emits a line whenever `\n` is encountered.
///
/// A `\r` immediately before the newline is stripped. Bytes that are not
/// valid UTF-8 are dropped rather than replaced.
pub struct LineAssembler {
    buffer: Vec<u8>,
    overflowed: bool,
    discarded: u64,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(128),
            overflowed: false,
            discarded: 0,
        }
    }

    /// Feed a chunk of bytes, returning every line it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &b in bytes {
            if b == b'\n' {
                if self.overflowed {
                    self.overflowed = false;
                    self.discarded += 1;
                } else {
                    if self.buffer.last() == Some(&b'\r') {
                        self.buffer.pop();
                    }
                    lines.push(lossless_text(&self.buffer));
                }
                self.buffer.clear();
                continue;
            }

            if self.overflowed {
                continue;
            }
            if self.buffer.len() == MAX_LINE_LEN {
                self.overflowed = true;
                self.buffer.clear();
                continue;
            }
            self.buffer.push(b);
        }

        lines
    }

    /// Drop any partial line (used when the link is re-opened).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
    }

    /// Number of over-long lines thrown away so far.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode UTF-8, skipping invalid sequences instead of substituting U+FFFD.
fn lossless_text(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}
