//! Town and player identifiers
//!
//! Town ids are short, human-friendly codes that can be read out loud.

use std::fmt;

use rand::Rng;

use crate::sync::PlayerId;

/// Characters used in generated ids (unambiguous, uppercase)
/// Excludes: 0/O, 1/I/L, 5/S, 2/Z
const ALPHABET: &[u8] = b"346789ABCDEFGHJKMNPQRTUVWXY";

const TOWN_ID_LENGTH: usize = 8;

const PLAYER_ID_LENGTH: usize = 12;

/// Identifier of one running town
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TownId(String);

impl TownId {
    pub fn random() -> Self {
        TownId(random_code(TOWN_ID_LENGTH))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a town id from user input
    ///
    /// Separators and case are ignored.
    pub fn parse(input: &str) -> Option<Self> {
        let normalized: String = input
            .chars()
            .filter(|c| c.is_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if normalized.len() == TOWN_ID_LENGTH && normalized.bytes().all(|b| ALPHABET.contains(&b)) {
            Some(TownId(normalized))
        } else {
            None
        }
    }
}

impl fmt::Display for TownId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // XXXX-XXXX
        write!(f, "{}-{}", &self.0[..4], &self.0[4..])
    }
}

/// Fresh id for a player joining a town
pub fn generate_player_id() -> PlayerId {
    format!("player-{}", random_code(PLAYER_ID_LENGTH).to_ascii_lowercase())
}

fn random_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_town_id_parse() {
        let id = TownId::parse("ABCD-EFGH").unwrap();
        assert_eq!(id.as_str(), "ABCDEFGH");

        let id = TownId::parse("abcd efgh").unwrap();
        assert_eq!(id.as_str(), "ABCDEFGH");

        assert!(TownId::parse("ABC").is_none());
        assert!(TownId::parse("ABCDEFGHJ").is_none());
        // 0 is not in the alphabet
        assert!(TownId::parse("ABCD-EFG0").is_none());
    }

    #[test]
    fn test_town_id_display() {
        let id = TownId::parse("ABCDEFGH").unwrap();
        assert_eq!(id.to_string(), "ABCD-EFGH");
    }

    #[test]
    fn test_random_ids_are_valid() {
        let id = TownId::random();
        assert_eq!(TownId::parse(&id.to_string()), Some(id.clone()));
        assert_ne!(TownId::random(), id);
    }

    #[test]
    fn test_player_ids() {
        let a = generate_player_id();
        let b = generate_player_id();
        assert!(a.starts_with("player-"));
        assert_eq!(a.len(), "player-".len() + 12);
        assert_ne!(a, b);
    }
}
