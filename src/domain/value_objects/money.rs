//! Money is carried as integer minor units (cents) in the platform currency.

/// Amount in minor units of the platform currency.
pub type Cents = i64;

/// Human readable amount, e.g. `12.50 USD`. Used in notification text.
pub fn format_cents(amount: Cents, currency: &str) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!(
        "{}{}.{:02} {}",
        sign,
        abs / 100,
        abs % 100,
        currency.to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(1250, "usd"), "12.50 USD");
        assert_eq!(format_cents(5, "eur"), "0.05 EUR");
        assert_eq!(format_cents(-700, "usd"), "-7.00 USD");
    }
}
