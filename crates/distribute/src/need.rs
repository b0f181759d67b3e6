//! Deciding which resources a recipient needs.

use crate::Recipient;
use partbook_archive::base_name;
use std::collections::BTreeSet;

/// Instrument token of a resource name: the file stem, lowercased, with
/// everything that isn't a letter removed.
///
/// ```
/// use partbook_distribute::instrument_token;
///
/// assert_eq!(instrument_token("Trumpet 1.pdf"), "trumpet");
/// assert_eq!(instrument_token("brass/Horn in F (2).pdf"), "horninf");
/// assert_eq!(instrument_token("trombone3"), "trombone");
/// ```
pub fn instrument_token(name: &str) -> String {
    let file = base_name(name);
    let stem = match file.rsplit_once('.') {
        Some((stem, _extension)) if !stem.is_empty() => stem,
        _ => file,
    };
    letters(stem)
}

/// Lowercase letters of `text`, everything else dropped.
fn letters(text: &str) -> String {
    text.chars().filter(|c| c.is_alphabetic()).flat_map(char::to_lowercase).collect()
}

/// Whether an instrument-group label and a token refer to the same
/// instrument: either contains the other once both are reduced to lowercase
/// letters, so `"French Horn"` matches `"frenchhorn"`. Empty labels and tokens
/// never match.
pub fn label_matches(label: &str, token: &str) -> bool {
    let (label, token) = (letters(label), letters(token));
    if label.is_empty() || token.is_empty() {
        return false;
    }
    token.contains(&label) || label.contains(&token)
}

/// Indices into `tokens` of the resources `recipient` needs for `org`.
pub(crate) fn needs(recipient: &Recipient, org: &str, tokens: &[String]) -> BTreeSet<usize> {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, token)| recipient.groups_for(org).any(|label| label_matches(label, token)))
        .map(|(index, _)| index)
        .collect()
}
