//! Chunk number sets in the compact range-list form used on the wire
//! (`"1-2,4-6,8"`).

use std::collections::BTreeSet;
use std::fmt::Write;

use crate::error::RangeError;

/// Upper bound on the numbers a single `start-end` token may expand to.
pub const MAX_RANGE_SPAN: u32 = 1 << 20;

/// Transforms `"1-2,4-6,8"` into `[1, 2, 4, 5, 6, 8]`.
///
/// Tokens are expanded in the order given; duplicates are kept. Empty tokens
/// (including an empty input) contribute nothing.
pub fn expand(ranges: &str) -> Result<Vec<u32>, RangeError> {
    let mut out = Vec::new();

    for token in ranges.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match token.split_once('-') {
            Some((start, end)) => {
                let start = parse_bound(start, token)?;
                let end = parse_bound(end, token)?;
                if start > end {
                    return Err(RangeError::Reversed { start, end });
                }
                if end - start >= MAX_RANGE_SPAN {
                    return Err(RangeError::TooLarge { start, end, limit: MAX_RANGE_SPAN });
                }
                out.extend(start..=end);
            }
            None => out.push(parse_bound(token, token)?),
        }
    }

    Ok(out)
}

/// Transforms `[1, 2, 4, 5, 6, 8]` into `"1-2,4-6,8"`.
///
/// Input order and duplicates don't matter; the output lists maximal contiguous runs
/// in ascending order.
pub fn compress<I>(chunks: I) -> String
where
    I: IntoIterator<Item = u32>,
{
    let sorted: BTreeSet<u32> = chunks.into_iter().collect();
    let mut out = String::new();
    let mut iter = sorted.into_iter();

    let Some(mut start) = iter.next() else {
        return out;
    };
    let mut prev = start;

    for n in iter {
        if n == prev + 1 {
            prev = n;
            continue;
        }
        push_run(&mut out, start, prev);
        start = n;
        prev = n;
    }
    push_run(&mut out, start, prev);

    out
}

fn push_run(out: &mut String, start: u32, end: u32) {
    if !out.is_empty() {
        out.push(',');
    }
    // Writing to a String cannot fail.
    let _ = if start == end { write!(out, "{start}") } else { write!(out, "{start}-{end}") };
}

fn parse_bound(s: &str, token: &str) -> Result<u32, RangeError> {
    s.trim().parse().map_err(|_| RangeError::InvalidToken { token: token.to_string() })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_expand() {
        assert_eq!(expand("1-2,4-6,8").unwrap(), vec![1, 2, 4, 5, 6, 8]);
        assert_eq!(expand("7").unwrap(), vec![7]);
        assert_eq!(expand("").unwrap(), Vec::<u32>::new());
        assert_eq!(expand("3-3").unwrap(), vec![3]);
    }

    #[test]
    fn test_expand_rejects_garbage() {
        assert_eq!(
            expand("1,x").unwrap_err(),
            RangeError::InvalidToken { token: "x".to_string() }
        );
        assert_eq!(expand("5-2").unwrap_err(), RangeError::Reversed { start: 5, end: 2 });
        assert!(matches!(expand("0-4000000000"), Err(RangeError::TooLarge { .. })));
    }

    #[test]
    fn test_compress() {
        assert_eq!(compress([1, 2, 4, 5, 6, 8]), "1-2,4-6,8");
        assert_eq!(compress([8, 1, 2, 2, 6, 5, 4]), "1-2,4-6,8");
        assert_eq!(compress([3]), "3");
        assert_eq!(compress(Vec::<u32>::new()), "");
        assert_eq!(compress([1, 3, 5]), "1,3,5");
    }

    proptest! {
        #[test]
        fn expand_inverts_compress(set in proptest::collection::btree_set(0u32..5000, 0..200)) {
            let compressed = compress(set.iter().copied());
            let expanded = expand(&compressed).unwrap();
            prop_assert_eq!(expanded, set.into_iter().collect::<Vec<_>>());
        }
    }
}
