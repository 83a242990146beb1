//! Secret wrapper for session material (cookies, browser-check tokens)

use std::fmt;

use zeroize::Zeroize;

/// Sensitive value - redacted in Debug/Display/logs, wiped on drop.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Length of the wrapped string, safe to log.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Empty or whitespace-only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_redacts_debug_and_display() {
        let secret = Secret::new(String::from("sess=abc123; auth_id=42"));
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(format!("{secret}"), "[REDACTED]");
    }

    #[test]
    fn secret_exposes_value() {
        let secret = Secret::new(String::from("x-bc-token"));
        assert_eq!(secret.expose(), "x-bc-token");
        assert_eq!(secret.len(), 10);
    }

    #[test]
    fn whitespace_only_is_blank() {
        assert!(Secret::new(String::from("   ")).is_blank());
        assert!(!Secret::new(String::from("   ")).is_empty());
        assert!(!Secret::new(String::from("a")).is_blank());
    }
}
