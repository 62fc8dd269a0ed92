//! Error types for the admission webhook
//!
//! Request-scoped failures are local and terminal to the single admission
//! request that produced them; nothing shared is mutated.

use thiserror::Error;

/// Main error type for webhook operations
#[derive(Debug, Error)]
pub enum Error {
    /// The admission request's object payload could not be decoded into a Pod
    #[error("decode error: {message}")]
    Decode {
        /// Description of what failed to decode
        message: String,
    },

    /// Startup configuration problem (template file, TLS material)
    #[error("config error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },
}

impl Error {
    /// Create a decode error with the given message
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    /// Create a config error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_carries_message() {
        let err = Error::decode("containers is not an array");
        assert!(err.to_string().contains("decode error"));
        assert!(err.to_string().contains("containers is not an array"));
    }

    #[test]
    fn config_error_carries_message() {
        let err = Error::config("template file missing");
        assert!(err.to_string().contains("config error"));
        assert!(err.to_string().contains("template file missing"));
    }

    #[test]
    fn error_construction_accepts_str_and_string() {
        let dynamic = format!("cannot open {}", "/etc/webhook/template.yaml");
        let err = Error::config(dynamic);
        assert!(err.to_string().contains("/etc/webhook/template.yaml"));

        let err = Error::decode("static message");
        assert!(err.to_string().contains("static message"));
    }
}
