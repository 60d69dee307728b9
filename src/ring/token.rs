//! Tokens and half-open token ranges on the hash ring

use serde::{Deserialize, Serialize};

/// Number of distinct tokens on the ring (2^64)
pub const RING_SPAN: u128 = 1 << 64;

/// Position on a Murmur3-style ring spanning the whole `i64` domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(pub i64);

impl Token {
    pub const MIN: Token = Token(i64::MIN);
    pub const MAX: Token = Token(i64::MAX);

    /// Move clockwise by `delta` tokens, wrapping past `MAX`
    pub fn offset(self, delta: u128) -> Token {
        Token((self.0 as u64).wrapping_add(delta as u64) as i64)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The tokens in `(start, end]`, walking clockwise
///
/// `start == end` covers the whole ring. `start > end` wraps through
/// `Token::MAX` back to `Token::MIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenRange {
    pub start: Token,
    pub end: Token,
}

impl TokenRange {
    pub const fn new(start: Token, end: Token) -> Self {
        Self { start, end }
    }

    pub const fn full_ring() -> Self {
        Self::new(Token::MIN, Token::MIN)
    }

    pub fn is_full_ring(&self) -> bool {
        self.start == self.end
    }

    /// Whether the range passes through `Token::MAX`
    pub fn wraps(&self) -> bool {
        self.start >= self.end
    }

    /// Number of tokens covered
    pub fn span(&self) -> u128 {
        if self.is_full_ring() {
            RING_SPAN
        } else {
            u128::from((self.end.0 as u64).wrapping_sub(self.start.0 as u64))
        }
    }

    /// Split at the numeric midpoint; `None` once a single token remains
    pub fn bisect(&self) -> Option<(TokenRange, TokenRange)> {
        let span = self.span();
        if span <= 1 {
            return None;
        }
        let mid = self.start.offset(span / 2);
        Some((TokenRange::new(self.start, mid), TokenRange::new(mid, self.end)))
    }

    pub fn contains(&self, token: Token) -> bool {
        if self.is_full_ring() {
            true
        } else if self.start < self.end {
            self.start < token && token <= self.end
        } else {
            token > self.start || token <= self.end
        }
    }

    /// Equivalent ranges that do not wrap, suitable for `token > ? AND token <= ?`
    ///
    /// `Token::MIN` itself is never assigned to a key, so the piece
    /// `(MIN, end]` loses nothing.
    pub fn non_wrapping(&self) -> Vec<TokenRange> {
        if !self.wraps() {
            return vec![*self];
        }
        let mut pieces = Vec::with_capacity(2);
        if self.start != Token::MAX {
            pieces.push(TokenRange::new(self.start, Token::MAX));
        }
        if self.end != Token::MIN {
            pieces.push(TokenRange::new(Token::MIN, self.end));
        }
        pieces
    }
}

impl std::fmt::Display for TokenRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}]", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span() {
        assert_eq!(TokenRange::full_ring().span(), RING_SPAN);
        assert_eq!(TokenRange::new(Token(0), Token(10)).span(), 10);
        assert_eq!(TokenRange::new(Token(10), Token(0)).span(), RING_SPAN - 10);
        assert_eq!(TokenRange::new(Token::MAX, Token::MIN).span(), 1);
    }

    #[test]
    fn test_bisect_full_ring() {
        let (left, right) = TokenRange::full_ring().bisect().unwrap();
        assert_eq!(left, TokenRange::new(Token::MIN, Token(0)));
        assert_eq!(right, TokenRange::new(Token(0), Token::MIN));
        assert_eq!(left.span() + right.span(), RING_SPAN);
    }

    #[test]
    fn test_single_token_is_not_bisected() {
        assert!(TokenRange::new(Token(4), Token(5)).bisect().is_none());
        assert!(TokenRange::new(Token(4), Token(6)).bisect().is_some());
    }

    #[test]
    fn test_contains_wrapping() {
        let range = TokenRange::new(Token(100), Token(-100));
        assert!(range.contains(Token(i64::MAX)));
        assert!(range.contains(Token(-100)));
        assert!(!range.contains(Token(100)));
        assert!(!range.contains(Token(0)));
    }

    #[test]
    fn test_non_wrapping() {
        let range = TokenRange::new(Token(100), Token(-100));
        assert_eq!(
            range.non_wrapping(),
            vec![
                TokenRange::new(Token(100), Token::MAX),
                TokenRange::new(Token::MIN, Token(-100)),
            ]
        );
        assert_eq!(
            TokenRange::new(Token(0), Token::MIN).non_wrapping(),
            vec![TokenRange::new(Token(0), Token::MAX)]
        );
        assert_eq!(
            TokenRange::full_ring().non_wrapping(),
            vec![TokenRange::new(Token::MIN, Token::MAX)]
        );
    }
}
