/// Inclusive token id interval. One chunk is one batch fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRange {
    pub low: u64,
    pub high: u64,
}

impl TokenRange {
    pub fn new(low: u64, high: u64) -> Self {
        Self { low, high }
    }

    pub fn len(&self) -> u64 {
        if self.high < self.low {
            0
        } else {
            self.high - self.low + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<u64> {
        (self.low..=self.high).collect()
    }

    /// Split into consecutive chunks of `size` ids; the last one may be shorter.
    pub fn chunks(&self, size: u64) -> Vec<TokenRange> {
        let size = size.max(1);
        let mut out = Vec::new();
        if self.is_empty() {
            return out;
        }
        let mut low = self.low;
        loop {
            let high = low.saturating_add(size - 1).min(self.high);
            out.push(TokenRange::new(low, high));
            match high.checked_add(1) {
                Some(next) if next <= self.high => low = next,
                _ => break,
            }
        }
        out
    }
}

impl std::fmt::Display for TokenRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_450_ids_into_three_chunks() {
        let chunks = TokenRange::new(1, 450).chunks(200);
        assert_eq!(
            chunks,
            vec![
                TokenRange::new(1, 200),
                TokenRange::new(201, 400),
                TokenRange::new(401, 450),
            ]
        );
    }

    #[test]
    fn chunks_cover_every_id_exactly_once() {
        for (max, size) in [(1u64, 1u64), (7, 3), (200, 200), (201, 200), (999, 17)] {
            let ids: Vec<u64> = TokenRange::new(1, max)
                .chunks(size)
                .iter()
                .flat_map(|c| c.ids())
                .collect();
            assert_eq!(ids, (1..=max).collect::<Vec<_>>(), "max={max} size={size}");
        }
    }

    #[test]
    fn empty_range_has_no_chunks() {
        assert!(TokenRange::new(1, 0).chunks(200).is_empty());
        assert_eq!(TokenRange::new(1, 0).len(), 0);
    }

    #[test]
    fn range_ending_at_u64_max_terminates() {
        let chunks = TokenRange::new(u64::MAX - 4, u64::MAX).chunks(2);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], TokenRange::new(u64::MAX, u64::MAX));
    }
}
