//! Secret types for storage credentials.
//!
//! Re-exports [`secrecy`] so every crate holds access keys the same way.
//! `SecretString` redacts itself in `Debug`, so deriving `Debug` on a
//! descriptor that carries credentials never prints them, and the value is
//! zeroized on drop.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct StaticCredentials {
//!     access_key: String,
//!     secret_key: SecretString,
//! }
//!
//! let creds = StaticCredentials {
//!     access_key: "AKIAEXAMPLE".to_string(),
//!     secret_key: SecretString::from("wJalrXUtnFEMI"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("wJalrXUtnFEMI"));
//! assert_eq!(creds.secret_key.expose_secret(), "wJalrXUtnFEMI");
//! ```

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("aws-secret-key");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("aws-secret-key"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("hmac-secret");
        assert_eq!(secret.expose_secret(), "hmac-secret");
    }

    #[test]
    fn test_clone_keeps_value() {
        let secret = SecretString::from("cloneable");
        let cloned = secret.clone();
        assert_eq!(cloned.expose_secret(), "cloneable");
    }
}
