//! `Grpc-Timeout` parsing.
//!
//! The header value is a positive integer of at most eight digits followed
//! by a unit letter: `H` hours, `M` minutes, `S` seconds, `m` milliseconds,
//! `u` microseconds, `n` nanoseconds. `350m` means 350 milliseconds.

use std::time::Duration;

/// Header carrying the client deadline.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

const MAX_TIMEOUT_DIGITS: usize = 8;

/// A `Grpc-Timeout` value that does not match the grammar.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("protocol error: invalid grpc-timeout value {value:?}")]
pub struct TimeoutParseError {
    value: String,
}

/// Parse a `Grpc-Timeout` header value into a duration.
///
/// The grammar is strict: one to eight decimal digits without a leading
/// zero, then exactly one unit letter. Anything else is an error the caller
/// reports as an invalid argument.
pub fn parse_timeout(value: &str) -> Result<Duration, TimeoutParseError> {
    let malformed = || TimeoutParseError {
        value: value.to_owned(),
    };

    let bytes = value.as_bytes();
    if bytes.len() < 2 || bytes.len() > MAX_TIMEOUT_DIGITS + 1 {
        return Err(malformed());
    }

    let (digits, unit) = bytes.split_at(bytes.len() - 1);
    if digits[0] == b'0' || !digits.iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }
    let count: u64 = value[..digits.len()].parse().map_err(|_| malformed())?;

    match unit[0] {
        b'H' => Ok(Duration::from_secs(count * 3600)),
        b'M' => Ok(Duration::from_secs(count * 60)),
        b'S' => Ok(Duration::from_secs(count)),
        b'm' => Ok(Duration::from_millis(count)),
        b'u' => Ok(Duration::from_micros(count)),
        b'n' => Ok(Duration::from_nanos(count)),
        _ => Err(malformed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_each_unit() {
        assert_eq!(parse_timeout("2H").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_timeout("3M").unwrap(), Duration::from_secs(180));
        assert_eq!(parse_timeout("45S").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_timeout("350m").unwrap(), Duration::from_millis(350));
        assert_eq!(parse_timeout("500u").unwrap(), Duration::from_micros(500));
        assert_eq!(parse_timeout("999n").unwrap(), Duration::from_nanos(999));
    }

    #[test]
    fn test_parse_max_digits() {
        assert_eq!(
            parse_timeout("99999999S").unwrap(),
            Duration::from_secs(99_999_999)
        );
        assert!(parse_timeout("100000000S").is_err());
    }

    #[test]
    fn test_parse_rejects_missing_unit() {
        assert!(parse_timeout("100").is_err());
    }

    #[test]
    fn test_parse_rejects_leading_zero() {
        assert!(parse_timeout("0S").is_err());
        assert!(parse_timeout("007S").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_timeout("").is_err());
        assert!(parse_timeout("abc").is_err());
        assert!(parse_timeout("S").is_err());
        assert!(parse_timeout("12X").is_err());
        assert!(parse_timeout("-5S").is_err());
        assert!(parse_timeout("1.5S").is_err());
        assert!(parse_timeout("5 S").is_err());
    }

    #[test]
    fn test_error_message_names_the_value() {
        let err = parse_timeout("abc").unwrap_err();
        assert!(err.to_string().contains("abc"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Reference form of the grammar: `[1-9][0-9]{0,7}` then one unit.
        fn grammar_accepts(value: &str) -> bool {
            let bytes = value.as_bytes();
            if bytes.len() < 2 || bytes.len() > MAX_TIMEOUT_DIGITS + 1 {
                return false;
            }
            let (digits, unit) = bytes.split_at(bytes.len() - 1);
            (b'1'..=b'9').contains(&digits[0])
                && digits.iter().all(u8::is_ascii_digit)
                && matches!(unit[0], b'H' | b'M' | b'S' | b'm' | b'u' | b'n')
        }

        proptest! {
            /// Every valid (count, unit) pair parses to the duration the
            /// unit dictates.
            #[test]
            fn valid_pairs_roundtrip(count in 1u64..=99_999_999, unit in "[HMSmun]") {
                let value = format!("{count}{unit}");
                let parsed = parse_timeout(&value).unwrap();
                let expected = match unit.as_str() {
                    "H" => Duration::from_secs(count * 3600),
                    "M" => Duration::from_secs(count * 60),
                    "S" => Duration::from_secs(count),
                    "m" => Duration::from_millis(count),
                    "u" => Duration::from_micros(count),
                    _ => Duration::from_nanos(count),
                };
                prop_assert_eq!(parsed, expected);
            }

            /// The parser accepts exactly the grammar, nothing else.
            #[test]
            fn parser_matches_grammar(value in "\\PC{0,12}") {
                prop_assert_eq!(parse_timeout(&value).is_ok(), grammar_accepts(&value));
            }
        }
    }
}
