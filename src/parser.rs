//! Decoding of instrument lines into [`Reading`]s.
//!
//! The saccharimeter prints one line per measurement. The usual shape is
//! `<pol_baca> <brix> <pol> <extra...>`; an out-of-range field is printed with
//! asterisks, e.g. `69.78  -0.01  *90****  *90***`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// One measurement as reported by the instrument.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    pub pol_baca: f64,
    pub brix: f64,
    pub pol: f64,
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pol Baca={:?}, Brix={:?}, Pol={:?}",
            self.pol_baca, self.brix, self.pol
        )
    }
}

/// Why a line produced no reading. Not an error: the line is only echoed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseSkipped {
    #[error("empty line")]
    Empty,
    #[error("expected at least 3 fields, got {0}")]
    TooFewFields(usize),
    #[error("expected 3 numeric fields, found {0}")]
    NotEnoughNumbers(usize),
}

fn numeral_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-?\d+(\.\d+)?").expect("numeral pattern is valid"))
}

/// Plain numeric parse. Non-finite values (`nan`, `inf`) are not measurements.
pub fn parse_number(token: &str) -> Option<f64> {
    token.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Resolves a field that did not parse directly.
///
/// A field containing `*` is flagged invalid by the instrument and resolves to
/// `0.0`. Otherwise the first embedded numeral is taken.
///
/// A field with neither a `*` nor a numeral (`OVER`, `---`) gives `None`, not
/// `0.0`. [`parse_line`] then drops the four-field reading and scans the line
/// for plain numbers instead, so a status word never becomes a zero reading.
pub fn extract_numeral(field: &str) -> Option<f64> {
    if field.contains('*') {
        return Some(0.0);
    }
    numeral_pattern()
        .find(field)
        .and_then(|m| parse_number(m.as_str()))
}

fn resolve_field(field: &str) -> Option<f64> {
    parse_number(field).or_else(|| extract_numeral(field))
}

fn parse_primary(tokens: &[&str]) -> Option<Reading> {
    if tokens.len() < 4 {
        return None;
    }
    Some(Reading {
        pol_baca: resolve_field(tokens[0])?,
        brix: resolve_field(tokens[1])?,
        pol: resolve_field(tokens[2])?,
    })
}

fn parse_positional(tokens: &[&str]) -> Result<Reading, ParseSkipped> {
    let numbers: Vec<f64> = tokens.iter().filter_map(|t| parse_number(t)).collect();
    match numbers.as_slice() {
        [pol_baca, brix, pol, ..] => Ok(Reading {
            pol_baca: *pol_baca,
            brix: *brix,
            pol: *pol,
        }),
        _ => Err(ParseSkipped::NotEnoughNumbers(numbers.len())),
    }
}

/// Decodes one trimmed line from the instrument.
///
/// Lines of four or more fields take the first three positionally; a field
/// that is not a plain number goes through [`extract_numeral`]. If that fails,
/// or the line only has three fields, every plain number on the line is
/// collected and the first three are used.
pub fn parse_line(line: &str) -> Result<Reading, ParseSkipped> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(ParseSkipped::Empty);
    }
    if tokens.len() < 3 {
        return Err(ParseSkipped::TooFewFields(tokens.len()));
    }
    if let Some(reading) = parse_primary(&tokens) {
        return Ok(reading);
    }
    parse_positional(&tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_numeric_fields_are_taken_in_order() {
        let reading = parse_line("69.78 12.5 10.25 1").unwrap();
        assert_eq!(
            reading,
            Reading {
                pol_baca: 69.78,
                brix: 12.5,
                pol: 10.25
            }
        );
    }

    #[test]
    fn asterisk_field_resolves_to_zero() {
        let reading = parse_line("69.78  -0.01  *90****  *90***").unwrap();
        assert_eq!(reading.pol_baca, 69.78);
        assert_eq!(reading.brix, -0.01);
        assert_eq!(reading.pol, 0.0);
    }

    #[test]
    fn wordy_field_is_unresolved_not_zero() {
        assert_eq!(extract_numeral("OVER"), None);
        assert_eq!(extract_numeral("---"), None);
        assert_eq!(
            parse_line("OVER 12.5 3.0 1.0 X"),
            Ok(Reading { pol_baca: 12.5, brix: 3.0, pol: 1.0 })
        );
        assert_eq!(
            parse_line("OVER 12.5 3.0 X"),
            Err(ParseSkipped::NotEnoughNumbers(2))
        );
    }

    #[test]
    fn any_asterisk_wins_over_digits() {
        for field in ["*", "12.5*", "*-3.2", "9*9", "**"] {
            assert_eq!(extract_numeral(field), Some(0.0), "field {field:?}");
        }
    }

    #[test]
    fn embedded_numeral_is_extracted() {
        assert_eq!(extract_numeral("12.5%"), Some(12.5));
        assert_eq!(extract_numeral("Z-4.75"), Some(-4.75));
        assert_eq!(extract_numeral("abc"), None);
    }

    #[test]
    fn three_field_line_uses_positional_numbers() {
        let reading = parse_line("1.5 2.5 3.5").unwrap();
        assert_eq!(
            reading,
            Reading {
                pol_baca: 1.5,
                brix: 2.5,
                pol: 3.5
            }
        );
    }

    #[test]
    fn garbage_primary_falls_back_to_positional_scan() {
        let reading = parse_line("POL 84.1 BX 18.2 P 14.9").unwrap();
        assert_eq!(reading.pol_baca, 84.1);
        assert_eq!(reading.brix, 18.2);
        assert_eq!(reading.pol, 14.9);
    }

    #[test]
    fn two_numbers_are_not_enough() {
        assert_eq!(
            parse_line("1.5 x 2.5"),
            Err(ParseSkipped::NotEnoughNumbers(2))
        );
    }

    #[test]
    fn short_and_empty_lines_are_skipped() {
        assert_eq!(parse_line(""), Err(ParseSkipped::Empty));
        assert_eq!(parse_line("   "), Err(ParseSkipped::Empty));
        assert_eq!(parse_line("12.0 13.0"), Err(ParseSkipped::TooFewFields(2)));
    }

    #[test]
    fn non_finite_tokens_are_not_numbers() {
        assert_eq!(parse_number("nan"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number(" -0.01 "), Some(-0.01));
    }
}
