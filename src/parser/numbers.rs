/// Width of an IBGE food code. A value token of exactly this many digits is a
/// code that leaked into the value run.
pub const CODE_DIGITS: usize = 7;

/// Tokens the tables print instead of a number (trace, not determined, not
/// applicable, dashes). Compared case-insensitively.
const ABSENT_MARKERS: &[&str] = &[
    "tr", "traço", "traços", "nd", "n.d.", "n/d", "na", "n.a.", "n/a", "-", "--", "—", "–",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Value(f64),
    Absent(AbsentCause),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsentCause {
    Marker,
    CodeToken,
    Unparseable,
}

impl Numeric {
    pub fn value(self) -> Option<f64> {
        match self {
            Numeric::Value(v) => Some(v),
            Numeric::Absent(_) => None,
        }
    }
}

pub fn is_absent_marker(token: &str) -> bool {
    let lower = token.trim().to_lowercase();
    lower.is_empty() || ABSENT_MARKERS.contains(&lower.as_str())
}

/// Syntactic test used to find where the value run starts: a digit, a signed
/// or bare-separator number, or an absent marker. Lowercase "na" is also a
/// Portuguese preposition inside preparation text, so it never opens the run.
pub fn looks_numeric(token: &str) -> bool {
    if is_absent_marker(token) {
        return token != "na";
    }
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('-' | '+' | ',' | '.') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

/// Convert one table token into a number or an explicit absence. Never fails.
pub fn normalize(token: &str) -> Numeric {
    let t = token.trim();
    if is_absent_marker(t) {
        return Numeric::Absent(AbsentCause::Marker);
    }
    if t.len() == CODE_DIGITS && t.bytes().all(|b| b.is_ascii_digit()) {
        return Numeric::Absent(AbsentCause::CodeToken);
    }

    let cleaned: String = t
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    let canonical = decimal_point(&cleaned);

    match canonical.parse::<f64>() {
        Ok(v) if v.is_finite() => Numeric::Value(v),
        _ => Numeric::Absent(AbsentCause::Unparseable),
    }
}

/// "1.234,5" -> "1234.5", "12,5" -> "12.5", "1,234.5" -> "1234.5".
fn decimal_point(s: &str) -> String {
    match (s.rfind(','), s.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(_), None) => s.replace(',', "."),
        _ => s.to_string(),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_comma() {
        assert_eq!(normalize("100,0"), Numeric::Value(100.0));
        assert_eq!(normalize("0,07"), Numeric::Value(0.07));
    }

    #[test]
    fn thousands_separators() {
        assert_eq!(normalize("1.234,5"), Numeric::Value(1234.5));
        assert_eq!(normalize("1,234.5"), Numeric::Value(1234.5));
    }

    #[test]
    fn plain_point_and_integer() {
        assert_eq!(normalize("17.77"), Numeric::Value(17.77));
        assert_eq!(normalize("382"), Numeric::Value(382.0));
    }

    #[test]
    fn markers_are_absent() {
        for t in ["Tr", "tr", "TR", "-", "—", "–", "nd", "N.D.", "n/d", "NA", "n.a.", ""] {
            assert_eq!(normalize(t), Numeric::Absent(AbsentCause::Marker), "token {:?}", t);
        }
    }

    #[test]
    fn seven_digit_token_is_a_code() {
        assert_eq!(normalize("9999999"), Numeric::Absent(AbsentCause::CodeToken));
        assert_eq!(normalize("6300101"), Numeric::Absent(AbsentCause::CodeToken));
    }

    #[test]
    fn separators_keep_long_numbers_numeric() {
        assert_eq!(normalize("99999,99"), Numeric::Value(99999.99));
        assert_eq!(normalize("12345678"), Numeric::Value(12345678.0));
    }

    #[test]
    fn footnote_characters_are_stripped() {
        assert_eq!(normalize("12,5*"), Numeric::Value(12.5));
        assert_eq!(normalize("3,51a"), Numeric::Value(3.51));
    }

    #[test]
    fn garbage_is_unparseable() {
        assert_eq!(normalize("abc"), Numeric::Absent(AbsentCause::Unparseable));
        assert_eq!(normalize("10-12"), Numeric::Absent(AbsentCause::Unparseable));
        assert_eq!(normalize("1,2,3"), Numeric::Absent(AbsentCause::Unparseable));
    }

    #[test]
    fn negative_values_parse() {
        assert_eq!(normalize("-5,0"), Numeric::Value(-5.0));
    }

    #[test]
    fn looks_numeric_splits_text_from_values() {
        assert!(looks_numeric("100,0"));
        assert!(looks_numeric("Tr"));
        assert!(looks_numeric("-"));
        assert!(looks_numeric("-0,5"));
        assert!(looks_numeric(",5"));
        assert!(looks_numeric("NA"));
        assert!(!looks_numeric("na"));
        assert!(!looks_numeric("cozido"));
        assert!(!looks_numeric("(sem"));
    }
}
