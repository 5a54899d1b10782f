//src/location.rs

//! Parsing of gene location strings such as `100..200`, `complement(100..150)`
//! or `join(100..200,400..900)` into at most two coordinate pairs.

/// Minimum length (`end - start + 1`) a parsed span needs to be used.
pub const MIN_SPAN_LENGTH: i64 = 20;

/// Minimum distance between the starts of two exons reported together.
pub const MIN_EXON_OFFSET: i64 = 50;

/// Parses a location into zero, one or two `(start, end)` pairs.
///
/// A plain `"<start> <end>"` pair is returned as-is. Otherwise the text must
/// have balanced parentheses; `join(...)`/`complement(...)` wrappers are
/// stripped, label-prefixed tokens (`NC_1.1:5..90`) ignored, and only the
/// first two comma-separated spans are considered.
pub fn parse_location(text: &str) -> Vec<(i32, i32)> {
    let text = text.trim();

    if let Some((start, end)) = parse_plain_pair(text) {
        // positions are never negative
        if start < 0 || end < 0 {
            return Vec::new();
        }
        return vec![(start, end)];
    }

    let opening = text.bytes().filter(|&b| b == b'(').count();
    let closing = text.bytes().filter(|&b| b == b')').count();
    if opening != closing {
        return Vec::new();
    }

    let inner = strip_wrappers(text);

    let mut spans: Vec<(i64, i64)> = Vec::with_capacity(2);
    for token in inner.split(',') {
        if token.contains(':') {
            continue;
        }
        if let Some(span) = first_and_last_number(token) {
            spans.push(span);
            if spans.len() == 2 {
                break;
            }
        }
    }

    select_spans(&spans)
}

/// Decides which of (up to) two candidate spans to report.
fn select_spans(spans: &[(i64, i64)]) -> Vec<(i32, i32)> {
    let qualifies = |(s, e): (i64, i64)| e - s + 1 >= MIN_SPAN_LENGTH;

    let first = spans.first().copied().filter(|&s| qualifies(s));
    let second = spans.get(1).copied().filter(|&s| qualifies(s));

    let chosen: Vec<(i64, i64)> = match (first, second) {
        (Some(a), Some(b)) if b.0 >= a.0 + MIN_EXON_OFFSET && b.1 >= b.0 => vec![a, b],
        (Some(a), Some(b)) => {
            if b.1 - b.0 > a.1 - a.0 {
                vec![b]
            } else {
                vec![a]
            }
        }
        (Some(a), None) => vec![a],
        (None, Some(b)) => vec![b],
        (None, None) => Vec::new(),
    };

    chosen
        .into_iter()
        .filter_map(|(s, e)| Some((i32::try_from(s).ok()?, i32::try_from(e).ok()?)))
        .collect()
}

/// Matches exactly `"<int> <int>"` with a single separating space.
fn parse_plain_pair(text: &str) -> Option<(i32, i32)> {
    let (a, b) = text.split_once(' ')?;
    let start = a.parse::<i32>().ok()?;
    let end = b.parse::<i32>().ok()?;
    Some((start, end))
}

/// Removes enclosing `name(...)` wrappers, outermost first.
fn strip_wrappers(mut text: &str) -> &str {
    loop {
        let Some(open) = text.find('(') else {
            return text;
        };
        if !text.ends_with(')') || !text[..open].bytes().all(|b| b.is_ascii_alphabetic()) {
            return text;
        }
        let candidate = &text[open + 1..text.len() - 1];
        if !is_balanced(candidate) {
            // `complement(1..30),complement(80..200)` style: the outer pair is not one group
            return text;
        }
        text = candidate;
    }
}

fn is_balanced(text: &str) -> bool {
    let mut depth = 0i32;
    for b in text.bytes() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// First run of digits -> start, last run of digits -> end.
fn first_and_last_number(token: &str) -> Option<(i64, i64)> {
    let bytes = token.as_bytes();
    let mut runs = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let begin = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            runs.push(&token[begin..i]);
        } else {
            i += 1;
        }
    }
    let start = runs.first()?.parse::<i64>().ok()?;
    let end = runs.last()?.parse::<i64>().ok()?;
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_pair_is_returned_directly() {
        assert_eq!(parse_location("100 200"), vec![(100, 200)]);
        // no length check on the plain form
        assert_eq!(parse_location("200 195"), vec![(200, 195)]);
    }

    #[test]
    fn negative_or_oversized_plain_pairs_are_rejected() {
        assert!(parse_location("5 -2147483648").is_empty());
        assert!(parse_location("-5 100").is_empty());
        assert!(parse_location("5 3000000000").is_empty());
        assert_eq!(parse_location("0 2147483647"), vec![(0, i32::MAX)]);
    }

    #[test]
    fn join_of_two_exons() {
        assert_eq!(
            parse_location("join(100..200,400..900)"),
            vec![(100, 200), (400, 900)]
        );
    }

    #[test]
    fn complement_single_span() {
        assert_eq!(parse_location("complement(100..150)"), vec![(100, 150)]);
    }

    #[test]
    fn short_span_is_rejected() {
        assert!(parse_location("10..15").is_empty());
    }

    #[test]
    fn unbalanced_parentheses_are_rejected() {
        assert!(parse_location("join(100..200,400..900").is_empty());
        assert!(parse_location("complement(100..150))").is_empty());
    }

    #[test]
    fn nested_wrappers_are_stripped() {
        assert_eq!(
            parse_location("complement(join(100..200,400..900))"),
            vec![(100, 200), (400, 900)]
        );
    }

    #[test]
    fn labelled_tokens_are_ignored() {
        assert_eq!(
            parse_location("join(NC_000913.3:1..500,1000..1100)"),
            vec![(1000, 1100)]
        );
    }

    #[test]
    fn close_exons_keep_only_the_longer_span() {
        // second start is less than 50 past the first
        assert_eq!(parse_location("join(100..200,120..400)"), vec![(120, 400)]);
        assert_eq!(parse_location("join(100..400,120..200)"), vec![(100, 400)]);
    }

    #[test]
    fn only_qualifying_span_survives() {
        assert_eq!(parse_location("join(100..105,400..900)"), vec![(400, 900)]);
        assert_eq!(parse_location("join(100..300,400..405)"), vec![(100, 300)]);
    }

    #[test]
    fn only_first_two_spans_are_inspected() {
        assert_eq!(
            parse_location("join(100..200,400..900,2000..3000)"),
            vec![(100, 200), (400, 900)]
        );
    }

    #[test]
    fn partial_markers_are_tolerated() {
        assert_eq!(parse_location("<1..>300"), vec![(1, 300)]);
    }
}
