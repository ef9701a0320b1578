//! Incremental UTF-8 decoding of a raw TCP byte stream.
//!
//! The wire carries bare UTF-8 with no framing, so a read may end in the
//! middle of a multi-byte character. [`Utf8StreamDecoder`] holds back the
//! incomplete tail until the next read completes it.

/// Incremental UTF-8 decoder that handles partial reads.
///
/// Feed bytes via [`Utf8StreamDecoder::feed`] and get back every complete
/// character. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    buf: Vec<u8>,
}

impl Utf8StreamDecoder {
    /// Create a new decoder with empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the decoder and return all complete text.
    ///
    /// An incomplete trailing sequence is buffered for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> String {
        self.buf.extend_from_slice(bytes);
        let mut text = String::with_capacity(self.buf.len());
        let mut consumed = 0;

        loop {
            let rest = &self.buf[consumed..];
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    consumed = self.buf.len();
                    break;
                }
                Err(e) => {
                    let valid_len = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&rest[..valid_len]));
                    match e.error_len() {
                        Some(bad_len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            consumed += valid_len + bad_len;
                        }
                        None => {
                            // Incomplete sequence at the end, wait for more data
                            consumed += valid_len;
                            break;
                        }
                    }
                }
            }
        }

        self.buf.drain(..consumed);
        text
    }

    /// Flush whatever is buffered at end of stream, lossily.
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        text
    }

    /// Returns true if the decoder has buffered partial data.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}
