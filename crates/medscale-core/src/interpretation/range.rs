//! Parsing of textual score ranges ("0-1", ">=20", "5+", "≤ 3 points").

/// A parsed range. Bounds carry their inclusiveness.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    pub value: f64,
    pub inclusive: bool,
}

impl Bound {
    fn inclusive(value: f64) -> Self {
        Self {
            value,
            inclusive: true,
        }
    }

    fn exclusive(value: f64) -> Self {
        Self {
            value,
            inclusive: false,
        }
    }
}

impl ScoreRange {
    pub fn contains(&self, score: f64) -> bool {
        let above = self.lower.map_or(true, |b| {
            if b.inclusive {
                score >= b.value
            } else {
                score > b.value
            }
        });
        let below = self.upper.map_or(true, |b| {
            if b.inclusive {
                score <= b.value
            } else {
                score < b.value
            }
        });
        above && below
    }

    /// Parse a range; `None` when no numeric form is recognized.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = skip_label(text);

        if let Some(rest) = strip_any(rest, &[">=", "≥", "=>"]) {
            let (value, _) = parse_number(rest)?;
            return Some(Self::at_least(value));
        }
        if let Some(rest) = strip_any(rest, &["<=", "≤", "=<"]) {
            let (value, _) = parse_number(rest)?;
            return Some(Self::at_most(value));
        }
        if let Some(rest) = rest.strip_prefix('>') {
            let (value, _) = parse_number(rest)?;
            return Some(Self {
                lower: Some(Bound::exclusive(value)),
                upper: None,
            });
        }
        if let Some(rest) = rest.strip_prefix('<') {
            let (value, _) = parse_number(rest)?;
            return Some(Self {
                lower: None,
                upper: Some(Bound::exclusive(value)),
            });
        }

        let (first, after) = parse_number(rest)?;
        let after = after.trim_start();

        if after.starts_with('+') {
            return Some(Self::at_least(first));
        }

        if let Some(tail) = strip_separator(after) {
            if let Some((second, _)) = parse_number(tail) {
                let (lo, hi) = if first <= second {
                    (first, second)
                } else {
                    (second, first)
                };
                return Some(Self {
                    lower: Some(Bound::inclusive(lo)),
                    upper: Some(Bound::inclusive(hi)),
                });
            }
        }

        Some(Self {
            lower: Some(Bound::inclusive(first)),
            upper: Some(Bound::inclusive(first)),
        })
    }

    fn at_least(value: f64) -> Self {
        Self {
            lower: Some(Bound::inclusive(value)),
            upper: None,
        }
    }

    fn at_most(value: f64) -> Self {
        Self {
            lower: None,
            upper: Some(Bound::inclusive(value)),
        }
    }
}

/// Skip leading words such as "Score:" before the numeric part.
fn skip_label(text: &str) -> &str {
    text.trim_start_matches(|c: char| c.is_alphabetic() || c.is_whitespace() || c == ':')
}

fn strip_any<'a>(text: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    prefixes.iter().find_map(|p| text.strip_prefix(p))
}

fn strip_separator(text: &str) -> Option<&str> {
    if let Some(rest) = strip_any(text, &["-", "–", "—"]) {
        return Some(rest);
    }
    for word in ["to", "a", "até", "hasta"] {
        if let Some(rest) = text.strip_prefix(word) {
            if rest.starts_with(char::is_whitespace) {
                return Some(rest);
            }
        }
    }
    None
}

/// Parse a leading (optionally signed) decimal number.
fn parse_number(text: &str) -> Option<(f64, &str)> {
    let text = text.trim_start();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;

    for (i, c) in text.char_indices() {
        match c {
            '-' | '+' if i == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }

    if !seen_digit {
        return None;
    }
    let number = text[..end].trim_end_matches('.');
    number.parse::<f64>().ok().map(|n| (n, &text[end..]))
}
