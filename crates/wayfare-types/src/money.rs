use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::TypeError;

/// Monetary amount. Always a decimal; ledger arguments carry it as a string.
pub type Money = Decimal;

/// Parse a decimal string as used in ledger arguments and payloads.
pub fn parse_money(field: &'static str, raw: &str) -> Result<Money, TypeError> {
    Decimal::from_str(raw.trim()).map_err(|e| TypeError::InvalidAmount {
        field,
        reason: e.to_string(),
    })
}

/// Require a strictly positive amount.
pub fn ensure_positive(field: &'static str, amount: Money) -> Result<Money, TypeError> {
    if amount <= Decimal::ZERO {
        return Err(TypeError::InvalidAmount {
            field,
            reason: format!("must be greater than zero, got {amount}"),
        });
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_strings() {
        assert_eq!(parse_money("price", "50.25").unwrap(), Decimal::new(5025, 2));
        assert_eq!(parse_money("price", " 10 ").unwrap(), Decimal::from(10));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_money("price", "fifty"),
            Err(TypeError::InvalidAmount { field: "price", .. })
        ));
    }

    #[test]
    fn positivity() {
        assert!(ensure_positive("amount", Decimal::ONE).is_ok());
        assert!(ensure_positive("amount", Decimal::ZERO).is_err());
        assert!(ensure_positive("amount", Decimal::NEGATIVE_ONE).is_err());
    }
}
