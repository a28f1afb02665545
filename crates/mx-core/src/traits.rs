//! Core traits for MonoX
//!
//! Operators depend only on these lookup capabilities, not on how the
//! correction tables behind them are stored or loaded.

/// Lookup-by-kinematic-variable capability of a correction table.
pub trait Lookup: Send + Sync {
    /// Number of input variables the table is binned in.
    fn dimension(&self) -> usize;

    /// Nominal value at the given coordinates.
    fn lookup(&self, vars: &[f64]) -> f64;

    /// Statistical uncertainty at the given coordinates (0 if not stored).
    fn uncertainty(&self, vars: &[f64]) -> f64 {
        let _ = vars;
        0.0
    }
}

/// Lookup capability of a table carrying named alternate values.
pub trait VariationLookup: Lookup {
    /// Names of the available variations.
    fn variation_names(&self) -> Vec<String>;

    /// Value of the named variation, or `None` if the table does not define it.
    fn lookup_variation(&self, vars: &[f64], variation: &str) -> Option<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flat(f64);

    impl Lookup for Flat {
        fn dimension(&self) -> usize {
            1
        }

        fn lookup(&self, _vars: &[f64]) -> f64 {
            self.0
        }
    }

    impl VariationLookup for Flat {
        fn variation_names(&self) -> Vec<String> {
            vec!["up".into()]
        }

        fn lookup_variation(&self, _vars: &[f64], variation: &str) -> Option<f64> {
            (variation == "up").then_some(self.0 * 2.0)
        }
    }

    #[test]
    fn test_flat_lookup() {
        let t = Flat(1.5);
        assert_eq!(t.lookup(&[100.0]), 1.5);
        assert_eq!(t.uncertainty(&[100.0]), 0.0);
        assert_eq!(t.lookup_variation(&[100.0], "up"), Some(3.0));
        assert_eq!(t.lookup_variation(&[100.0], "down"), None);
    }
}
