//! Loader for the assembler's object-code format.
//!
//! Object code is whitespace-separated hex byte pairs terminated by the
//! sentinel `zz`:
//!
//! ```text
//! D1 FC 15 F1 FC 16 00 zz
//! ```

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectError {
    #[error("object code token \"{0}\" is not a hex byte")]
    InvalidByte(String),
    #[error("object code is missing the zz terminator")]
    MissingTerminator,
}

/// Parse object-code text into the bytes to load at address 0.
pub fn parse_object_code(text: &str) -> Result<Vec<u8>, ObjectError> {
    let mut bytes = Vec::new();
    for token in text.split_whitespace() {
        if token.eq_ignore_ascii_case("zz") {
            return Ok(bytes);
        }
        if token.len() != 2 {
            return Err(ObjectError::InvalidByte(token.to_string()));
        }
        let byte = u8::from_str_radix(token, 16)
            .map_err(|_| ObjectError::InvalidByte(token.to_string()))?;
        bytes.push(byte);
    }
    Err(ObjectError::MissingTerminator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bytes_up_to_the_terminator() {
        let bytes = parse_object_code("D1 FC 15\nF1 FC 16 00 zz trailing ignored").expect("parses");
        assert_eq!(bytes, [0xD1, 0xFC, 0x15, 0xF1, 0xFC, 0x16, 0x00]);
    }

    #[test]
    fn terminator_is_case_insensitive() {
        assert_eq!(parse_object_code("00 ZZ").expect("parses"), [0x00]);
    }

    #[test]
    fn rejects_non_hex_tokens() {
        assert_eq!(
            parse_object_code("D1 G5 zz").err(),
            Some(ObjectError::InvalidByte("G5".to_string()))
        );
    }

    #[test]
    fn rejects_missing_terminator() {
        assert_eq!(
            parse_object_code("D1 FC").err(),
            Some(ObjectError::MissingTerminator)
        );
    }
}
