/// Rendemen (sugar yield) from Brix and Pol.
pub fn compute(brix: f64, pol: f64) -> f64 {
    0.7 * (pol - 0.5 * (brix - pol))
}

/// Display form used in the form and sent to the API.
pub fn format(value: f64) -> String {
    format!("{value:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_value() {
        assert!((compute(2.0, 1.0) - 0.35).abs() < 1e-12);
    }

    #[test]
    fn typical_cane_juice() {
        assert_eq!(format(compute(20.0, 16.0)), "9.80");
    }

    #[test]
    fn is_pure() {
        let a = compute(21.3, 17.8);
        let b = compute(21.3, 17.8);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn negative_inputs_are_accepted() {
        assert_eq!(format(compute(-0.01, 0.0)), "0.00");
        assert_eq!(format(compute(10.0, -2.0)), "-5.60");
    }
}
