//! Phone number normalization.
//!
//! Message stores key threads by the address string exactly as the network
//! delivered it, so `98765 43210`, `+91 98765-43210` and `919876543210`
//! must collapse to one form before they are compared.

/// Normalize `input` to `+<digits>`.
///
/// - A leading `+` is kept; every other non-digit is dropped.
/// - Ten bare digits are a national number: `default_country_code` is
///   prefixed.
/// - Twelve bare digits that already start with the country code only
///   gain the `+`.
/// - Anything else is assumed international and gains a `+`.
///
/// Returns an empty string when `input` holds no digits.
pub fn normalize_number(input: &str, default_country_code: &str) -> String {
    let trimmed = input.trim();
    let has_plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();

    if digits.is_empty() {
        return String::new();
    }
    if has_plus {
        return format!("+{digits}");
    }

    let cc: String = default_country_code
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if digits.len() == 10 && !cc.is_empty() {
        format!("+{cc}{digits}")
    } else {
        format!("+{digits}")
    }
}

/// Whether two raw addresses name the same number.
pub fn same_number(a: &str, b: &str, default_country_code: &str) -> bool {
    let a = normalize_number(a, default_country_code);
    !a.is_empty() && a == normalize_number(b, default_country_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn national_numbers_get_country_code() {
        assert_eq!(normalize_number("98765 43210", "91"), "+919876543210");
        assert_eq!(normalize_number("(555) 010-0199", "1"), "+15550100199");
    }

    #[test]
    fn international_forms_are_kept() {
        assert_eq!(normalize_number("+91 98765-43210", "91"), "+919876543210");
        assert_eq!(normalize_number("919876543210", "91"), "+919876543210");
        assert_eq!(normalize_number("+44 20 7946 0958", "91"), "+442079460958");
        assert_eq!(normalize_number("12345", "91"), "+12345");
    }

    #[test]
    fn degenerate_input() {
        assert_eq!(normalize_number("", "91"), "");
        assert_eq!(normalize_number("VM-HDFCBK", "91"), "");
        assert_eq!(normalize_number("9876543210", ""), "+9876543210");
    }

    #[test]
    fn comparison() {
        assert!(same_number("98765 43210", "+919876543210", "91"));
        assert!(!same_number("98765 43210", "+449876543210", "91"));
        assert!(!same_number("", "", "91"));
    }
}
