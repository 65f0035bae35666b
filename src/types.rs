/// Byte range into the source text.
pub type Span = std::ops::Range<usize>;
