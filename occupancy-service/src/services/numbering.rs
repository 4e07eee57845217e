//! Human-facing document numbers.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// `len` random upper-case alphanumerics.
fn token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect()
}

/// Occupation number, quoted by tenants as their mobile-money account reference.
pub fn occupation_number() -> String {
    format!("O{}", token(5))
}

pub fn invoice_number() -> String {
    format!("INV{}", token(8))
}

pub fn receipt_number() -> String {
    format!("RCT{}", token(8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_carry_their_prefix() {
        let occupation = occupation_number();
        assert_eq!(occupation.len(), 6);
        assert!(occupation.starts_with('O'));
        assert!(invoice_number().starts_with("INV"));
        assert!(receipt_number().starts_with("RCT"));
    }

    #[test]
    fn tokens_are_upper_case_alphanumerics() {
        let number = invoice_number();
        assert!(number
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }
}
