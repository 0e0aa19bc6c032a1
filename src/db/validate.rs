//! Payload validation
//!
//! The store treats payloads as opaque bytes; callers that want a schema
//! check pass a [`PayloadValidator`] to
//! [`Database::insert_validated`](super::Database::insert_validated).

/// Decides whether a payload may be stored
pub trait PayloadValidator {
    /// `Err` carries a human-readable reason
    fn validate(&self, payload: &[u8]) -> Result<(), String>;
}

/// Accepts every payload
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl PayloadValidator for AcceptAll {
    fn validate(&self, _payload: &[u8]) -> Result<(), String> {
        Ok(())
    }
}

/// Checks that a delimited UTF-8 text row carries at least `min_fields`
/// fields. A single trailing line ending is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldCountValidator {
    /// Field separator
    pub delimiter: char,
    /// Fewest fields a row may have
    pub min_fields: usize,
}

impl FieldCountValidator {
    /// Fields in one traffic-accident row
    pub const ACCIDENT_FIELDS: usize = 24;

    /// Validator for `delimiter`-separated rows of at least `min_fields`
    pub fn new(delimiter: char, min_fields: usize) -> Self {
        Self {
            delimiter,
            min_fields,
        }
    }

    /// The accident CSV layout: 24 `;`-separated fields
    pub fn accident_schema() -> Self {
        Self::new(';', Self::ACCIDENT_FIELDS)
    }
}

impl PayloadValidator for FieldCountValidator {
    fn validate(&self, payload: &[u8]) -> Result<(), String> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| format!("payload is not UTF-8: {}", e))?;
        let row = text
            .strip_suffix("\r\n")
            .or_else(|| text.strip_suffix('\n'))
            .unwrap_or(text);

        if row.contains('\n') {
            return Err("payload holds more than one row".to_string());
        }

        let fields = row.split(self.delimiter).count();
        if fields < self.min_fields {
            return Err(format!(
                "expected at least {} '{}'-separated fields, found {}",
                self.min_fields, self.delimiter, fields
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accident_row(fields: usize) -> String {
        (0..fields).map(|i| format!("f{}", i)).collect::<Vec<_>>().join(";")
    }

    #[test]
    fn test_accept_all() {
        assert!(AcceptAll.validate(b"\xff\x00anything").is_ok());
    }

    #[test]
    fn test_accident_row_accepted() {
        let validator = FieldCountValidator::accident_schema();
        assert!(validator.validate(accident_row(24).as_bytes()).is_ok());
        assert!(validator.validate(format!("{}\r\n", accident_row(24)).as_bytes()).is_ok());
        assert!(validator.validate(accident_row(26).as_bytes()).is_ok());
    }

    #[test]
    fn test_short_row_rejected() {
        let validator = FieldCountValidator::accident_schema();
        let err = validator.validate(accident_row(23).as_bytes()).unwrap_err();
        assert!(err.contains("23"));
    }

    #[test]
    fn test_non_utf8_and_multi_row_rejected() {
        let validator = FieldCountValidator::new(',', 2);
        assert!(validator.validate(b"\xff,\xfe").is_err());
        assert!(validator.validate(b"a,b\nc,d").is_err());
        assert!(validator.validate(b"a,b").is_ok());
    }
}
