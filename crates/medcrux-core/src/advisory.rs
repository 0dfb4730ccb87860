//! Fail-open policy for the advisory surface.
//!
//! Analysis code returns `Result`. The public entry points that sit on top of
//! an external primary judgment pass that result through [`fail_open`], so a
//! failure here degrades the advice instead of aborting the caller.

use crate::Result;

/// Returns the value, or logs the error and returns `T::default()`.
pub fn fail_open<T: Default>(result: Result<T>, operation: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::error!("{} failed, returning empty result: {}", operation, e);
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_fail_open_passes_values_through() {
        assert_eq!(fail_open(Ok(vec![1, 2]), "test"), vec![1, 2]);
    }

    #[test]
    fn test_fail_open_returns_default_on_error() {
        let result: Result<Vec<u8>> = Err(Error::NonFinite("aspect_ratio"));
        assert!(fail_open(result, "test").is_empty());
    }
}
