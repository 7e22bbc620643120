#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to(&self, other: Span) -> Span {
        Span::new(self.start, other.end)
    }

    /// One-based line and column of the span start, for diagnostics.
    pub fn line_col(&self, source: &str) -> (usize, usize) {
        let mut line = 1;
        let mut col = 1;
        for (offset, ch) in source.char_indices() {
            if offset >= self.start {
                break;
            }
            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_counts_from_one() {
        let source = "int x;\nint y;\n";
        assert_eq!(Span::new(0, 3).line_col(source), (1, 1));
        assert_eq!(Span::new(4, 5).line_col(source), (1, 5));
        assert_eq!(Span::new(7, 10).line_col(source), (2, 1));
        assert_eq!(Span::new(11, 12).line_col(source), (2, 5));
    }
}
