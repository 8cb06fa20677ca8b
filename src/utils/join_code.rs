// src/utils/join_code.rs

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;

/// No `I`, `O`, `0` or `1`, so codes survive being read aloud or copied by hand.
pub const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const CODE_LEN: usize = 6;

/// How many fresh codes `create_class` tries before giving up.
pub const MAX_ATTEMPTS: usize = 10;

static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-HJ-NP-Z2-9]{6}$").expect("join code pattern is valid")
});

pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// What a student types is trimmed and uppercased before lookup.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_uppercase()
}

pub fn is_well_formed(code: &str) -> bool {
    CODE_RE.is_match(code)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn generated_codes_are_well_formed() {
        for _ in 0..500 {
            let code = generate();
            assert_eq!(code.len(), CODE_LEN);
            assert!(is_well_formed(&code), "bad code {}", code);
        }
    }

    #[test]
    fn many_codes_are_mostly_distinct() {
        let codes: HashSet<String> = (0..1000).map(|_| generate()).collect();
        // 32^6 possibilities; a handful of birthday collisions at most.
        assert!(codes.len() > 990);
    }

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(normalize("  ab3kq9 \n"), "AB3KQ9");
        assert!(is_well_formed(&normalize(" ab3kq9")));
    }

    #[test]
    fn ambiguous_characters_are_rejected() {
        assert!(!is_well_formed("ABCDE0"));
        assert!(!is_well_formed("ABCDEI"));
        assert!(!is_well_formed("ABCDE"));
        assert!(!is_well_formed("abcdef"));
    }
}
