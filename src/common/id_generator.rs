// src/common/id_generator.rs
//! Crockford Base32 ID Generator
//!
//! Generates human-readable, prefixed IDs using Crockford Base32 encoding.
//! Format: PREFIX_XXXXXXXXXX (e.g., U_K7NP3XQ2TA for users)
//!
//! The alphabet excludes I, L, O and U, so ids survive being read aloud or
//! retyped from a support ticket.

use rand::Rng;

/// Crockford Base32 alphabet (excludes I, L, O, U to avoid confusion)
const CROCKFORD_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Random characters in a durable entity id (32^10 combinations).
const ENTITY_ID_LENGTH: usize = 10;

/// Entity type prefixes for ID generation
#[derive(Debug, Clone, Copy)]
pub enum EntityPrefix {
    /// Canonical user (U_)
    User,
    /// Linked external provider identity (X_)
    Identity,
}

impl EntityPrefix {
    /// Get the string prefix for this entity type
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityPrefix::User => "U",
            EntityPrefix::Identity => "X",
        }
    }
}

/// Generate a random Crockford Base32 string of specified length
fn generate_crockford_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..32);
            CROCKFORD_ALPHABET[idx] as char
        })
        .collect()
}

/// Generate a prefixed ID using Crockford Base32 encoding
pub fn generate_id(prefix: EntityPrefix) -> String {
    format!(
        "{}_{}",
        prefix.as_str(),
        generate_crockford_string(ENTITY_ID_LENGTH)
    )
}

/// Generate a User ID (U_XXXXXXXXXX)
pub fn generate_user_id() -> String {
    generate_id(EntityPrefix::User)
}

/// Generate an External Identity ID (X_XXXXXXXXXX)
pub fn generate_identity_id() -> String {
    generate_id(EntityPrefix::Identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_id_format() {
        let user_id = generate_user_id();
        assert!(user_id.starts_with("U_"));
        assert_eq!(user_id.len(), 12);

        let identity_id = generate_identity_id();
        assert!(identity_id.starts_with("X_"));
        assert_eq!(identity_id.len(), 12);
    }

    #[test]
    fn test_crockford_alphabet_only() {
        let id = generate_user_id();
        let random_part = &id[2..];

        for c in random_part.chars() {
            assert!(
                CROCKFORD_ALPHABET.contains(&(c as u8)),
                "Character '{}' not in Crockford alphabet",
                c
            );
        }
    }

    #[test]
    fn test_uniqueness() {
        let mut ids = HashSet::new();
        for _ in 0..1000 {
            assert!(ids.insert(generate_user_id()), "Duplicate ID generated");
        }
    }
}
