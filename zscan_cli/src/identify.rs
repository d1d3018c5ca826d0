//! Content identification for decompressed blocks.

/// Names the kind of content in a decompressed block.
///
/// `None` means generic data and the block is not annotated.
pub trait Classifier: Send + Sync {
    fn classify(&self, bytes: &[u8]) -> Option<&'static str>;
}

/// Sample length the text heuristic looks at.
const TEXT_SAMPLE: usize = 4096;

/// MIME type from `infer`'s magic-number matchers, falling back to a plain
/// text check.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureClassifier;

impl Classifier for SignatureClassifier {
    fn classify(&self, bytes: &[u8]) -> Option<&'static str> {
        if bytes.is_empty() {
            return Some("empty");
        }
        infer::get(bytes)
            .map(|kind| kind.mime_type())
            .or_else(|| is_text(bytes).then_some("text/plain"))
    }
}

fn is_text(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(TEXT_SAMPLE)];
    sample
        .iter()
        .all(|&b| matches!(b, b'\t' | b'\n' | b'\r' | 0x0C | 0x20..=0x7E))
}
