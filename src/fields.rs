use crate::data::AMap;

/// Pairs recorded on a span, kept in the span's extensions.
#[derive(Debug, Default)]
pub(crate) struct SpanPairs {
    pub(crate) pairs: AMap,
}
