//! Shared traits and numeric helpers for bookkeeping primitives.

use uuid::Uuid;

/// Decimal places kept on every derived monetary value unless configured otherwise.
pub const DEFAULT_PRECISION: u8 = 2;

/// Exposes a stable identifier for entities stored in a book.
pub trait Identifiable {
    fn id(&self) -> Uuid;
}

/// Provides read-only access to an entity's display name.
pub trait NamedEntity {
    fn name(&self) -> &str;
}

/// Converts an entity into a user-facing display label.
pub trait Displayable {
    fn display_label(&self) -> String;
}

/// Rounds `value` half away from zero to `precision` decimal places.
///
/// Non-finite inputs are returned untouched so callers can still reject them.
pub fn round_to(value: f64, precision: u8) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(precision as i32);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_to_clears_float_noise() {
        assert_eq!(round_to(0.1 + 0.2, 2), 0.3);
        assert_eq!(round_to(-150.004, 2), -150.0);
        assert_eq!(round_to(2.675, 3), 2.675);
    }

    #[test]
    fn round_to_normalizes_negative_zero() {
        let value = round_to(-0.001, 2);
        assert!(value.is_sign_positive());
    }
}
