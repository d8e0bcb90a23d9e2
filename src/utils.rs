//! Utility functions for identifiers

use bech32::Bech32m;
use uuid7::uuid7;

pub const CASE_HRP: &str = "case_";
pub const USER_HRP: &str = "user_";
pub const ADVISOR_HRP: &str = "advisor_";
pub const ADMIN_HRP: &str = "admin_";

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Returns true when `id` is a bech32 encoded uuid carrying the given prefix.
pub fn is_valid_id(id: &str, hrp: &str) -> bool {
    match bech32::decode(id) {
        Ok((decoded_hrp, data)) => decoded_hrp.as_str() == hrp && data.len() == 16,
        Err(_) => false,
    }
}

// lower-cased and trimmed, the form used for lookups
pub fn normalise_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_validate_against_their_prefix() {
        let id = new_uuid_to_bech32(CASE_HRP).unwrap();

        assert!(is_valid_id(&id, CASE_HRP));
        assert!(!is_valid_id(&id, USER_HRP));
    }

    #[test]
    fn garbage_is_not_an_id() {
        assert!(!is_valid_id("not-an-id", CASE_HRP));
        assert!(!is_valid_id("", CASE_HRP));
        assert!(!is_valid_id("case-001", CASE_HRP));
    }

    #[test]
    fn principal_prefixes() {
        let advisor = new_uuid_to_bech32(ADVISOR_HRP).unwrap();
        let admin = new_uuid_to_bech32(ADMIN_HRP).unwrap();

        assert!(is_valid_id(&advisor, ADVISOR_HRP));
        assert!(is_valid_id(&admin, ADMIN_HRP));
        assert!(!is_valid_id(&admin, ADVISOR_HRP));
    }

    #[test]
    fn emails_are_normalised() {
        assert_eq!(normalise_email("  Jo@Example.COM "), "jo@example.com");
    }
}
