//! Common utilities for the odflow toolkit

pub mod error;
pub mod index;

pub use error::{Error, Result};
pub use index::{defined, EdgeId, NodeId, ZoneId, NONE};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_message_names_role_and_reason() {
        let err = Error::missing("alt_impedance", "produce_alt_impedance is set");
        assert_eq!(
            err.to_string(),
            "Missing input: alt_impedance is required when produce_alt_impedance is set"
        );
        assert!(!err.is_data_error());
    }

    #[test]
    fn invalid_value_is_data_error() {
        let err = Error::InvalidValue {
            role: "impedance",
            position: 3,
            value: -1.0,
            reason: "negative",
        };
        assert!(err.is_data_error());
        assert!(err.to_string().contains("impedance[3]"));
    }

    #[test]
    fn defined_maps_sentinel_to_none() {
        assert_eq!(defined(NONE), None);
        assert_eq!(defined(7), Some(7));
    }
}
