//! crates/photosync_core/src/matching.rs
//!
//! The contact matching engine: maps a directory contact's phone numbers to
//! a messaging-network identity. Pure functions, no I/O.

use crate::domain::{MatchResult, MessagingIndex};

/// Position at which Brazilian mobile numbers gained their extra digit:
/// country code (2) + area code (2).
const BR_PREFIX_LEN: usize = 4;

/// Matches a directory contact's numbers against the messaging index.
///
/// Candidate numbers are tried in their original order; the first number
/// that yields a match wins. Each candidate gets a direct lookup and, for
/// Brazilian numbers, a single structural fallback. Numbers are expected in
/// canonical form: digits only, no leading `+`.
pub fn match_contact(numbers: &[String], index: &MessagingIndex) -> MatchResult {
    for number in numbers {
        if let Some(identity) = index.get(number.as_str()) {
            return MatchResult::matched(identity.clone());
        }
        if let Some(alternate) = brazilian_fallback(number) {
            if let Some(identity) = index.get(alternate.as_str()) {
                return MatchResult::matched(identity.clone());
            }
        }
    }
    MatchResult::unmatched()
}

/// Produces the single alternate form of a Brazilian mobile number.
///
/// Brazil inserted a leading `9` into mobile subscriber numbers; depending on
/// when either side stored the contact, one of the two forms is present:
/// - 12 digits (old format): insert `9` after the 4-digit country+area prefix.
/// - 13 digits (new format): remove the digit at that same position.
///
/// Returns `None` for non-Brazilian numbers and for lengths that have no
/// alternate form. Exactly one transform is attempted, never a multi-pass
/// search.
pub fn brazilian_fallback(number: &str) -> Option<String> {
    if !number.starts_with("55") {
        return None;
    }
    match number.len() {
        12 => {
            let (prefix, subscriber) = number.split_at(BR_PREFIX_LEN);
            Some(format!("{prefix}9{subscriber}"))
        }
        13 => {
            let mut alternate = String::with_capacity(12);
            alternate.push_str(&number[..BR_PREFIX_LEN]);
            alternate.push_str(&number[BR_PREFIX_LEN + 1..]);
            Some(alternate)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn index_of(entries: &[(&str, &str)]) -> MessagingIndex {
        entries
            .iter()
            .map(|(n, id)| (n.to_string(), id.to_string()))
            .collect()
    }

    #[test]
    fn direct_lookup_wins() {
        let index = index_of(&[("4915112345678", "id-de")]);
        let result = match_contact(&["4915112345678".into()], &index);
        assert_eq!(result, MatchResult::matched("id-de".into()));
    }

    #[test]
    fn twelve_digit_brazilian_number_gains_nine() {
        // Old-format number stored in the directory, new-format on the network.
        let index = index_of(&[("5511987654321", "id-br")]);
        let result = match_contact(&["551187654321".into()], &index);
        assert_eq!(result, MatchResult::matched("id-br".into()));
    }

    #[test]
    fn thirteen_digit_brazilian_number_drops_nine() {
        let index = index_of(&[("551133334444", "id1")]);
        let result = match_contact(&["5511933334444".into()], &index);
        assert_eq!(result, MatchResult::matched("id1".into()));
    }

    #[test]
    fn fallback_round_trips() {
        let original = "551187654321";
        let inserted = brazilian_fallback(original).unwrap();
        assert_eq!(inserted, "5511987654321");
        assert_eq!(brazilian_fallback(&inserted).unwrap(), original);
    }

    #[test]
    fn no_fallback_for_other_countries() {
        assert_eq!(brazilian_fallback("421187654321"), None);
        let index = index_of(&[("4211987654321", "id-sk")]);
        let result = match_contact(&["421187654321".into()], &index);
        assert_eq!(result, MatchResult::unmatched());
    }

    #[test]
    fn no_fallback_for_other_lengths() {
        assert_eq!(brazilian_fallback("5511"), None);
        assert_eq!(brazilian_fallback("55119876543210"), None);
    }

    #[test]
    fn first_matching_number_wins() {
        let index = index_of(&[("111", "first"), ("222", "second")]);
        let result = match_contact(&["333".into(), "111".into(), "222".into()], &index);
        assert_eq!(result, MatchResult::matched("first".into()));
    }

    #[test]
    fn unmatched_when_no_number_hits() {
        let index = index_of(&[("111", "id")]);
        let result = match_contact(&["222".into(), "333".into()], &index);
        assert_eq!(result, MatchResult::unmatched());
        assert!(result.identity.is_none());
    }

    #[test]
    fn empty_number_list_is_unmatched() {
        let index = index_of(&[("111", "id")]);
        assert_eq!(match_contact(&[], &index), MatchResult::unmatched());
    }
}
