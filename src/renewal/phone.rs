//! Phone number canonicalization.
//!
//! Stored phones are free-form and payers report theirs in whatever shape
//! their bank uses, so a single number is expanded into every digit string
//! it could plausibly have been stored as.

use std::collections::BTreeSet;

const COUNTRY_CODE: &str = "55";

/// Digit-only variants `raw` could appear as in storage: the literal digits,
/// with and without the country code, and with and without the mobile `9`
/// after the two-digit area code.
pub fn phone_variants(raw: &str) -> BTreeSet<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let mut variants = BTreeSet::new();
    if digits.is_empty() {
        return variants;
    }
    variants.insert(digits.clone());

    let national = national_number(&digits);
    let mut nationals = vec![national.to_string()];
    if let Some(toggled) = toggle_mobile_nine(national) {
        nationals.push(toggled);
    }

    for number in nationals {
        variants.insert(format!("{}{}", COUNTRY_CODE, number));
        variants.insert(number);
    }

    variants
}

/// Drops trunk zeros and the country code when what remains still looks like
/// an area code plus local number.
fn national_number(digits: &str) -> &str {
    let trimmed = digits.trim_start_matches('0');
    match trimmed.strip_prefix(COUNTRY_CODE) {
        Some(rest) if (10..=11).contains(&rest.len()) => rest,
        _ if trimmed.is_empty() => digits,
        _ => trimmed,
    }
}

fn toggle_mobile_nine(national: &str) -> Option<String> {
    if !(10..=11).contains(&national.len()) {
        return None;
    }
    let (area, local) = national.split_at(2);
    match local.len() {
        9 if local.starts_with('9') => Some(format!("{}{}", area, &local[1..])),
        8 => Some(format!("{}9{}", area, local)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_digits_always_present() {
        for raw in ["+55 (11) 98765-4321", "11 8765 4321", "123", "abc-1", "0055119876543210"] {
            let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
            assert!(phone_variants(raw).contains(&digits), "{}", raw);
        }
    }

    #[test]
    fn test_country_code_and_mobile_nine() {
        let variants = phone_variants("+55 (11) 98765-4321");
        for expected in ["5511987654321", "11987654321", "1187654321", "551187654321"] {
            assert!(variants.contains(expected), "missing {}", expected);
        }

        let variants = phone_variants("(21) 8765-4321");
        for expected in ["2187654321", "5521987654321", "21987654321", "552187654321"] {
            assert!(variants.contains(expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_malformed_input() {
        assert!(phone_variants("").is_empty());
        assert!(phone_variants("no digits").is_empty());
        let short = phone_variants("12-34");
        assert!(short.contains("1234"));
    }

    #[test]
    fn test_trunk_zero_is_dropped() {
        let variants = phone_variants("011 98765-4321");
        assert!(variants.contains("011987654321"));
        assert!(variants.contains("11987654321"));
        assert!(variants.contains("5511987654321"));
    }
}
