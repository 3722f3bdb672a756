/// Bounds applied to a list endpoint's ``limit`` query parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LimitBounds {
    /// Used when the client sends no ``limit``
    pub default: usize,
    /// Largest value a client may request
    pub max: usize,
}

impl LimitBounds {
    pub const fn new(default: usize, max: usize) -> Self {
        Self { default, max }
    }

    /// Resolve a raw ``limit`` query value.
    ///
    /// Values must be positive integers no larger than ``max``; anything else
    /// is reported back as a message for the 400 response. Numeric strings
    /// such as ``"20"`` and ``" 20 "`` are accepted.
    pub fn resolve(&self, raw: Option<&str>) -> Result<usize, String> {
        let Some(raw) = raw else {
            return Ok(self.default);
        };

        let value: i64 = raw
            .trim()
            .parse()
            .map_err(|_| format!("limit must be an integer, got {:?}", raw))?;

        if value <= 0 {
            return Err("limit must be positive".to_string());
        }
        if value as u64 > self.max as u64 {
            return Err(format!("limit must be at most {}", self.max));
        }

        Ok(value as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDS: LimitBounds = LimitBounds::new(50, 100);

    #[test]
    fn test_default_when_absent() {
        assert_eq!(BOUNDS.resolve(None), Ok(50));
    }

    #[test]
    fn test_accepts_numeric_strings() {
        assert_eq!(BOUNDS.resolve(Some("20")), Ok(20));
        assert_eq!(BOUNDS.resolve(Some(" 100 ")), Ok(100));
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(BOUNDS.resolve(Some("0")).is_err());
        assert!(BOUNDS.resolve(Some("-3")).is_err());
        assert!(BOUNDS.resolve(Some("101")).is_err());
        assert!(BOUNDS.resolve(Some("ten")).is_err());
    }
}
