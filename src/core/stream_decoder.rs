use futures_util::{Stream, StreamExt};

const REPLACEMENT_CHARACTER: char = '\u{FFFD}';

/// The response body could not be read to completion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("stream read failed: {reason}")]
pub struct StreamReadFailure {
    pub reason: String,
}

impl StreamReadFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<String> for StreamReadFailure {
    fn from(reason: String) -> Self {
        Self::new(reason)
    }
}

/// Turns a stream of raw byte chunks into UTF-8 text fragments, in arrival
/// order.
///
/// A character whose bytes straddle two chunks is held back until it is
/// complete, so fragments never contain a torn character. Malformed sequences
/// become U+FFFD. Once the underlying stream ends or fails the decoder is
/// spent and every later read reports completion.
pub struct StreamDecoder<S> {
    inner: S,
    pending: Vec<u8>,
    finished: bool,
}

impl<S, B, E> StreamDecoder<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<StreamReadFailure>,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            finished: false,
        }
    }

    /// Waits for the next fragment. `Ok(None)` means the stream is done.
    pub async fn next_fragment(&mut self) -> Result<Option<String>, StreamReadFailure> {
        if self.finished {
            return Ok(None);
        }

        loop {
            match self.inner.next().await {
                Some(Ok(chunk)) => {
                    self.pending.extend_from_slice(chunk.as_ref());
                    let text = self.decode_available();
                    if !text.is_empty() {
                        return Ok(Some(text));
                    }
                }
                Some(Err(err)) => {
                    self.finished = true;
                    self.pending.clear();
                    return Err(err.into());
                }
                None => {
                    self.finished = true;
                    if self.pending.is_empty() {
                        return Ok(None);
                    }
                    let tail = String::from_utf8_lossy(&self.pending).into_owned();
                    self.pending.clear();
                    return Ok(Some(tail));
                }
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drains every complete character from `pending`, leaving an incomplete
    /// trailing sequence (if any) for the next chunk.
    fn decode_available(&mut self) -> String {
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        Some(invalid) => {
                            out.push(REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    type Chunk = Result<Vec<u8>, String>;

    fn decoder_for(chunks: Vec<Chunk>) -> StreamDecoder<stream::Iter<std::vec::IntoIter<Chunk>>> {
        StreamDecoder::new(stream::iter(chunks))
    }

    async fn collect(chunks: Vec<Chunk>) -> Result<Vec<String>, StreamReadFailure> {
        let mut decoder = decoder_for(chunks);
        let mut fragments = Vec::new();
        while let Some(fragment) = decoder.next_fragment().await? {
            fragments.push(fragment);
        }
        Ok(fragments)
    }

    #[tokio::test]
    async fn fragments_arrive_in_order() {
        let fragments = collect(vec![
            Ok(b"For".to_vec()),
            Ok(b"tune ".to_vec()),
            Ok(b"favors ".to_vec()),
            Ok(b"you.".to_vec()),
        ])
        .await
        .expect("decode");
        assert_eq!(fragments, vec!["For", "tune ", "favors ", "you."]);
    }

    #[tokio::test]
    async fn split_multibyte_character_decodes_like_unsplit_text() {
        let text = "naïve café ☕ 🎉";
        let bytes = text.as_bytes();

        for split in 1..bytes.len() {
            let fragments = collect(vec![
                Ok(bytes[..split].to_vec()),
                Ok(bytes[split..].to_vec()),
            ])
            .await
            .expect("decode");
            assert_eq!(fragments.concat(), text, "split at byte {split}");
            assert!(fragments.iter().all(|f| !f.contains(REPLACEMENT_CHARACTER)));
        }
    }

    #[tokio::test]
    async fn byte_at_a_time_never_yields_empty_fragments() {
        let text = "🎉ok";
        let chunks = text.bytes().map(|b| Ok(vec![b])).collect();
        let fragments = collect(chunks).await.expect("decode");
        assert_eq!(fragments, vec!["🎉", "o", "k"]);
    }

    #[tokio::test]
    async fn invalid_bytes_become_replacement_characters() {
        let fragments = collect(vec![Ok(vec![b'a', 0xFF, b'b'])])
            .await
            .expect("decode");
        assert_eq!(fragments, vec!["a\u{FFFD}b"]);
    }

    #[tokio::test]
    async fn truncated_character_at_end_is_replaced() {
        let euro = "€".as_bytes();
        let fragments = collect(vec![Ok(b"x".to_vec()), Ok(euro[..2].to_vec())])
            .await
            .expect("decode");
        assert_eq!(fragments.concat(), "x\u{FFFD}");
    }

    #[tokio::test]
    async fn read_errors_surface_and_end_the_stream() {
        let mut decoder = decoder_for(vec![
            Ok(b"partial".to_vec()),
            Err("connection reset".to_string()),
            Ok(b"never seen".to_vec()),
        ]);

        assert_eq!(
            decoder.next_fragment().await,
            Ok(Some("partial".to_string()))
        );
        let failure = decoder.next_fragment().await.expect_err("read failure");
        assert_eq!(failure.reason, "connection reset");
        assert!(decoder.is_finished());
        assert_eq!(decoder.next_fragment().await, Ok(None));
    }

    #[tokio::test]
    async fn completion_is_sticky() {
        let mut decoder = decoder_for(vec![Ok(b"done".to_vec())]);
        assert_eq!(decoder.next_fragment().await, Ok(Some("done".into())));
        assert_eq!(decoder.next_fragment().await, Ok(None));
        assert_eq!(decoder.next_fragment().await, Ok(None));
    }
}
