//! Phone number handling: normalization, lookup forms and DTMF digits

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CallError, CallResult};

/// Characters stripped from a number before dispatch or comparison
const SEPARATORS: [char; 4] = ['-', '/', '.', '\u{00AD}'];

/// Digits kept by the suffix fallback lookup
pub const FALLBACK_SUFFIX_LEN: usize = 6;

/// Strip whitespace, hyphens, slashes, periods and soft hyphens.
///
/// ```rust
/// use softphone_call_core::number::normalize_number;
///
/// assert_eq!(normalize_number("+1 555-0100"), "+15550100");
/// assert_eq!(normalize_number("02/345.67\u{00AD}89"), "023456789");
/// ```
pub fn normalize_number(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !SEPARATORS.contains(c))
        .collect()
}

/// A pattern handed to the contacts collaborator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumberPattern {
    /// The stored (normalized) number must equal this value
    Exact(String),
    /// The stored (normalized) number must end with this value
    EndsWith(String),
}

impl NumberPattern {
    /// Whether a stored number satisfies this pattern
    pub fn matches(&self, stored: &str) -> bool {
        let stored = normalize_number(stored);
        match self {
            Self::Exact(value) => stored == *value,
            Self::EndsWith(suffix) => stored.ends_with(suffix.as_str()),
        }
    }
}

/// Forms of a caller number that are tried as exact matches
///
/// Always includes the normalized number itself, followed by its
/// international (`+<cc>...`) and national (`0...`) forms when they can be
/// derived. Duplicates are dropped, order is preserved.
pub fn exact_lookup_forms(number: &str, country_code: Option<&str>) -> Vec<String> {
    let normalized = normalize_number(number);
    let country_code = country_code
        .map(|cc| cc.trim_start_matches('+'))
        .filter(|cc| !cc.is_empty());

    let mut forms = vec![normalized.clone()];

    let international = if let Some(rest) = normalized.strip_prefix("00") {
        Some(format!("+{}", rest))
    } else if let (Some(rest), Some(cc)) = (normalized.strip_prefix('0'), country_code) {
        Some(format!("+{}{}", cc, rest))
    } else if normalized.starts_with('+') {
        Some(normalized.clone())
    } else {
        None
    };

    if let Some(international) = international {
        if let Some(cc) = country_code {
            if let Some(national) = international
                .strip_prefix('+')
                .and_then(|digits| digits.strip_prefix(cc))
            {
                forms.push(international.clone());
                forms.push(format!("0{}", national));
            } else {
                forms.push(international);
            }
        } else {
            forms.push(international);
        }
    }

    let mut seen = Vec::with_capacity(forms.len());
    for form in forms {
        if !form.is_empty() && !seen.contains(&form) {
            seen.push(form);
        }
    }
    seen
}

/// Last [`FALLBACK_SUFFIX_LEN`] digits of a number, used when exact forms miss
///
/// Handles misdetected country prefixes. Returns `None` for numbers too short
/// for the heuristic to be meaningful.
pub fn fallback_suffix(number: &str) -> Option<String> {
    let digits: Vec<char> = number.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= FALLBACK_SUFFIX_LEN {
        return None;
    }
    Some(digits[digits.len() - FALLBACK_SUFFIX_LEN..].iter().collect())
}

/// A single keypad tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "char", into = "char")]
pub struct DtmfDigit(char);

impl DtmfDigit {
    /// The keypad character
    pub fn as_char(self) -> char {
        self.0
    }
}

impl TryFrom<char> for DtmfDigit {
    type Error = CallError;

    fn try_from(digit: char) -> CallResult<Self> {
        let upper = digit.to_ascii_uppercase();
        match upper {
            '0'..='9' | '*' | '#' | 'A'..='D' => Ok(Self(upper)),
            _ => Err(CallError::InvalidDtmf { digit }),
        }
    }
}

impl From<DtmfDigit> for char {
    fn from(digit: DtmfDigit) -> char {
        digit.0
    }
}

impl fmt::Display for DtmfDigit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_separators() {
        assert_eq!(normalize_number("+1 555-0100"), "+15550100");
        assert_eq!(normalize_number(" 02 / 345.67-89 "), "023456789");
        assert_eq!(normalize_number("0470\u{00AD}123\t456"), "0470123456");
        assert_eq!(normalize_number("   "), "");
    }

    #[test]
    fn test_double_zero_prefix_becomes_international() {
        let forms = exact_lookup_forms("0032455123456", Some("32"));
        assert_eq!(forms[0], "0032455123456");
        assert!(forms.contains(&"+32455123456".to_string()));
        assert!(forms.contains(&"0455123456".to_string()));
    }

    #[test]
    fn test_national_prefix_uses_country_code() {
        let forms = exact_lookup_forms("0455 12 34 56", Some("+32"));
        assert_eq!(forms, vec!["0455123456".to_string(), "+32455123456".to_string()]);
    }

    #[test]
    fn test_international_number_yields_national_form() {
        let forms = exact_lookup_forms("+32455123456", Some("32"));
        assert_eq!(forms, vec!["+32455123456".to_string(), "0455123456".to_string()]);
    }

    #[test]
    fn test_without_country_code_only_double_zero_is_rewritten() {
        assert_eq!(exact_lookup_forms("0455123456", None), vec!["0455123456".to_string()]);
        assert_eq!(
            exact_lookup_forms("0044207946", None),
            vec!["0044207946".to_string(), "+44207946".to_string()]
        );
    }

    #[test]
    fn test_fallback_suffix() {
        assert_eq!(fallback_suffix("+32455123456").as_deref(), Some("123456"));
        assert_eq!(fallback_suffix("123456"), None);
        assert_eq!(fallback_suffix("101"), None);
    }

    #[test]
    fn test_pattern_matching_normalizes_stored_numbers() {
        assert!(NumberPattern::Exact("+32455123456".into()).matches("+32 455 12 34 56"));
        assert!(NumberPattern::EndsWith("123456".into()).matches("+1 (455) 123-456"));
        assert!(!NumberPattern::Exact("0455".into()).matches("04551"));
    }

    #[test]
    fn test_dtmf_digits() {
        assert_eq!(DtmfDigit::try_from('5').unwrap().as_char(), '5');
        assert_eq!(DtmfDigit::try_from('#').unwrap().to_string(), "#");
        assert_eq!(DtmfDigit::try_from('a').unwrap().as_char(), 'A');
        assert!(matches!(DtmfDigit::try_from('x'), Err(CallError::InvalidDtmf { digit: 'x' })));
    }
}
