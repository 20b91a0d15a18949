use std::ops::Range;

/// The slice of a flat sequence that belongs to one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub range: Range<usize>,
}

/// Maps a flat buffer sequence into per-function segments.
///
/// Segments are contiguous, in sorted name order, and cover `0..len()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatLayout {
    segments: Vec<Segment>,
    len: usize,
}

impl FlatLayout {
    /// Creates a new `FlatLayout`.
    ///
    /// # Arguments
    /// * `counts` - The name and amount of buffers of each function, in flat order.
    ///
    /// # Returns
    /// A new `FlatLayout` instance.
    pub fn new<'a, I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, usize)>,
    {
        let mut len = 0;
        let segments = counts
            .into_iter()
            .map(|(name, count)| {
                let range = len..len + count;
                len += count;
                Segment {
                    name: name.to_string(),
                    range,
                }
            })
            .collect();

        Self { segments, len }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The range of the flat sequence owned by `name`, if it's part of the layout.
    pub fn segment(&self, name: &str) -> Option<Range<usize>> {
        self.segments
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.range.clone())
    }

    /// The total amount of buffers in the flat sequence.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
