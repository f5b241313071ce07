//! Result comparators.

use thiserror::Error;

/// Binary agreement predicate over two core results
pub trait Comparator<T: ?Sized>: Send + Sync {
    /// Whether `a` and `b` count as the same result
    fn agree(&self, a: &T, b: &T) -> bool;

    /// Whether agreement is transitive.
    ///
    /// Adjacent-pair checking only implies all-pairs agreement when this holds.
    fn is_transitive(&self) -> bool {
        true
    }

    /// Short name for logs and reports
    fn name(&self) -> &str;
}

/// Invalid comparator parameters
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ComparatorError {
    /// Tolerance negative or NaN
    #[error("epsilon must be a non-negative number, got {0}")]
    InvalidEpsilon(f64),
}

/// `PartialEq` equality. For floats this is IEEE equality (`NaN != NaN`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Exact;

impl<T: PartialEq + ?Sized> Comparator<T> for Exact {
    fn agree(&self, a: &T, b: &T) -> bool {
        a == b
    }

    fn name(&self) -> &str {
        "exact"
    }
}

/// `|a - b| <= epsilon`. Not transitive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Epsilon {
    epsilon: f64,
}

impl Epsilon {
    /// Tolerance comparator
    pub fn new(epsilon: f64) -> Result<Self, ComparatorError> {
        if epsilon.is_nan() || epsilon < 0.0 {
            return Err(ComparatorError::InvalidEpsilon(epsilon));
        }
        Ok(Self { epsilon })
    }

    /// Configured tolerance
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl Comparator<f64> for Epsilon {
    fn agree(&self, a: &f64, b: &f64) -> bool {
        (a - b).abs() <= self.epsilon
    }

    fn is_transitive(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "epsilon"
    }
}

impl Comparator<f32> for Epsilon {
    fn agree(&self, a: &f32, b: &f32) -> bool {
        f64::from(a - b).abs() <= self.epsilon
    }

    fn is_transitive(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "epsilon"
    }
}

impl Comparator<[f64]> for Epsilon {
    fn agree(&self, a: &[f64], b: &[f64]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= self.epsilon)
    }

    fn is_transitive(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "epsilon"
    }
}

impl Comparator<Vec<f64>> for Epsilon {
    fn agree(&self, a: &Vec<f64>, b: &Vec<f64>) -> bool {
        Comparator::<[f64]>::agree(self, a, b)
    }

    fn is_transitive(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "epsilon"
    }
}

/// Caller-supplied predicate
pub struct FnComparator<F> {
    predicate: F,
    transitive: bool,
    name: String,
}

impl<F> FnComparator<F> {
    /// Wrap `predicate`. Declare `transitive` honestly; it gates the
    /// non-transitivity warning for more than two cores.
    pub fn new(name: impl Into<String>, transitive: bool, predicate: F) -> Self {
        Self {
            predicate,
            transitive,
            name: name.into(),
        }
    }
}

impl<T: ?Sized, F> Comparator<T> for FnComparator<F>
where
    F: Fn(&T, &T) -> bool + Send + Sync,
{
    fn agree(&self, a: &T, b: &T) -> bool {
        (self.predicate)(a, b)
    }

    fn is_transitive(&self) -> bool {
        self.transitive
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact() {
        assert!(Exact.agree(&13, &13));
        assert!(!Exact.agree(&13, &14));
        assert!(!Exact.agree(&7.0001_f64, &7.0002_f64));
        assert!(!Exact.agree(&f64::NAN, &f64::NAN));
        assert!(Exact.agree(&0.0_f64, &-0.0_f64));
        assert!(Comparator::<i32>::is_transitive(&Exact));
    }

    #[test]
    fn test_epsilon() {
        let eps = Epsilon::new(0.001).unwrap();
        assert!(eps.agree(&7.0001_f64, &7.0002_f64));
        assert!(!eps.agree(&7.0_f64, &7.01_f64));
        assert!(!Comparator::<f64>::is_transitive(&eps));
    }

    #[test]
    fn test_epsilon_chain_is_not_transitive() {
        let eps = Epsilon::new(0.001).unwrap();
        let (a, b, c) = (1.0_f64, 1.0008, 1.0016);
        assert!(eps.agree(&a, &b));
        assert!(eps.agree(&b, &c));
        assert!(!eps.agree(&a, &c));
    }

    #[test]
    fn test_epsilon_vectors() {
        let eps = Epsilon::new(0.01).unwrap();
        assert!(eps.agree(&vec![1.0, 2.0], &vec![1.005, 2.0]));
        assert!(!eps.agree(&vec![1.0, 2.0], &vec![1.0]));
    }

    #[test]
    fn test_invalid_epsilon() {
        assert_eq!(Epsilon::new(-1.0), Err(ComparatorError::InvalidEpsilon(-1.0)));
        assert!(Epsilon::new(f64::NAN).is_err());
    }

    #[test]
    fn test_fn_comparator() {
        let parity = FnComparator::new("parity", true, |a: &i32, b: &i32| a % 2 == b % 2);
        assert!(parity.agree(&2, &4));
        assert!(!parity.agree(&2, &3));
        assert_eq!(Comparator::<i32>::name(&parity), "parity");
    }
}
