use chrono::NaiveDate;

use crate::{CoreError, CoreResult};

/// GB 11643 weights for the first 17 digits of a resident identity number
const CHECKSUM_WEIGHTS: [u32; 17] = [7, 9, 10, 5, 8, 4, 2, 1, 6, 3, 7, 9, 10, 5, 8, 4, 2];
const CHECKSUM_CHARS: [char; 11] = ['1', '0', 'X', '9', '8', '7', '6', '5', '4', '3', '2'];

/// Rules applied to passenger identity documents at booking time
#[derive(Debug, Clone, Copy, Default)]
pub struct IdDocumentPolicy {
    /// Also verify the trailing check character
    pub strict_checksum: bool,
}

impl IdDocumentPolicy {
    pub fn new(strict_checksum: bool) -> Self {
        Self { strict_checksum }
    }

    /// Validate an 18-character national identity number.
    ///
    /// Always checks the layout (17 digits followed by a digit or `X`), a
    /// non-zero region prefix and a real calendar birth date. The check
    /// character is only verified when `strict_checksum` is set.
    pub fn validate(&self, id_number: &str) -> CoreResult<()> {
        let id = id_number.trim();
        let chars: Vec<char> = id.chars().collect();

        if chars.len() != 18 {
            return Err(CoreError::IdentityError(format!(
                "id number must be 18 characters, got {}",
                chars.len()
            )));
        }

        if !chars[..17].iter().all(|c| c.is_ascii_digit()) {
            return Err(CoreError::IdentityError("id number body must be digits".to_string()));
        }

        let last = chars[17].to_ascii_uppercase();
        if !(last.is_ascii_digit() || last == 'X') {
            return Err(CoreError::IdentityError("id number must end in a digit or X".to_string()));
        }

        if &id[..6] == "000000" {
            return Err(CoreError::IdentityError("id number region code is empty".to_string()));
        }

        if NaiveDate::parse_from_str(&id[6..14], "%Y%m%d").is_err() {
            return Err(CoreError::IdentityError("id number birth date is not a valid date".to_string()));
        }

        if self.strict_checksum && expected_check_char(&chars[..17]) != last {
            return Err(CoreError::IdentityError("id number check character mismatch".to_string()));
        }

        Ok(())
    }
}

fn expected_check_char(body: &[char]) -> char {
    let sum: u32 = body
        .iter()
        .zip(CHECKSUM_WEIGHTS.iter())
        .map(|(c, w)| c.to_digit(10).unwrap_or(0) * w)
        .sum();
    CHECKSUM_CHARS[(sum % 11) as usize]
}
