//! Coercion of externally supplied keys into plan identifiers.

use mealplan_db::models::PlanId;

use crate::error::PlanError;

/// Parse a raw key (path segment, CLI argument) into a [`PlanId`].
///
/// Every hierarchy table is keyed by an integer, so a key that does not
/// parse as one can never match a row and is rejected as
/// [`PlanError::InvalidKey`].
pub fn parse_key(raw: &str) -> Result<PlanId, PlanError> {
    raw.trim()
        .parse::<PlanId>()
        .map_err(|_| PlanError::InvalidKey(raw.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_keys_parse() {
        assert_eq!(parse_key("1").unwrap(), 1);
        assert_eq!(parse_key(" 42 ").unwrap(), 42);
    }

    #[test]
    fn non_integer_keys_are_invalid() {
        for raw in ["", "abc", "1.5", "99999999999999999999"] {
            let err = parse_key(raw).unwrap_err();
            assert!(matches!(err, PlanError::InvalidKey(ref k) if k == raw), "{raw:?}");
        }
    }
}
