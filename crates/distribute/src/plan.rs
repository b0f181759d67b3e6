//! Ordering recipients so consecutive emails share as many attachments as
//! possible, and tracking when each attachment is no longer needed.

use crate::Recipient;
use crate::error::{ErrorKind, Result};
use crate::matrix::SimilarityMatrix;
use crate::need::{instrument_token, needs};
use std::collections::{BTreeMap, BTreeSet};
use tracing::instrument;

/// The outcome of [`prepare_emails`].
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Indices into the input recipients, in sending order. Recipients that
    /// need nothing are left out.
    pub order: Vec<usize>,
    /// Resource name to the last position in `order` whose recipient needs
    /// it. Resources nobody needs have no entry.
    pub last_needed: BTreeMap<String, usize>,
    resources: Vec<String>,
    /// Need-set per input recipient, as indices into `resources`.
    needs: Vec<BTreeSet<usize>>,
}

/// One email of a [`Plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery<'a> {
    /// Position in the sending order.
    pub position: usize,
    pub recipient: &'a Recipient,
    /// Resource names to attach, in input order.
    pub attach: Vec<&'a str>,
    /// Resource names nobody after this delivery needs.
    pub release: Vec<&'a str>,
}

/// Plan the emails sending `resources` of `org` to `recipients`.
///
/// A recipient needs a resource when one of its instrument-group labels for
/// `org` matches the resource's [`instrument_token`]. The result only
/// depends on its inputs.
#[instrument(skip(recipients, resources), fields(recipients = recipients.len(), resources = resources.len()))]
pub fn prepare_emails(org: &str, recipients: &[Recipient], resources: &[String]) -> Result<Plan> {
    if let Some(index) = recipients.iter().position(|r| r.email.trim().is_empty()) {
        exn::bail!(ErrorKind::InvalidRecipient(index));
    }
    let mut seen = BTreeSet::new();
    if let Some(duplicate) = resources.iter().find(|name| !seen.insert(name.as_str())) {
        exn::bail!(ErrorKind::DuplicateResource(duplicate.clone()));
    }

    let tokens: Vec<String> = resources.iter().map(|name| instrument_token(name)).collect();
    let needs: Vec<BTreeSet<usize>> = recipients.iter().map(|r| needs(r, org, &tokens)).collect();
    let order: Vec<usize> = SimilarityMatrix::new(&needs)
        .chain()
        .into_iter()
        .filter(|&index| !needs[index].is_empty())
        .collect();

    let mut last_needed = BTreeMap::new();
    for (position, &index) in order.iter().enumerate() {
        for &resource in &needs[index] {
            last_needed.insert(resources[resource].clone(), position);
        }
    }
    let skipped = recipients.len() - order.len();
    if skipped > 0 {
        tracing::debug!(skipped, "Recipients without matching parts left out");
    }

    Ok(Plan { order, last_needed, resources: resources.to_vec(), needs })
}

impl Plan {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Resource names nobody needs.
    pub fn unclaimed(&self) -> impl Iterator<Item = &str> {
        self.resources
            .iter()
            .filter(|name| !self.last_needed.contains_key(name.as_str()))
            .map(String::as_str)
    }

    /// Walk the plan in sending order. `recipients` must be the slice the plan
    /// was prepared from.
    pub fn deliveries<'a>(&'a self, recipients: &'a [Recipient]) -> impl Iterator<Item = Delivery<'a>> + 'a {
        self.order.iter().enumerate().map(move |(position, &index)| {
            let attach: Vec<&str> = self.needs[index].iter().map(|&r| self.resources[r].as_str()).collect();
            let release = attach.iter().copied().filter(|name| self.last_needed.get(*name) == Some(&position)).collect();
            Delivery { position, recipient: &recipients[index], attach, release }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORG: &str = "wind-band";

    fn resources() -> Vec<String> {
        ["trumpet1", "clarinet2", "trombone3", "bass"].map(String::from).to_vec()
    }

    fn recipients() -> Vec<Recipient> {
        vec![
            Recipient::new("r0@example.org").with_groups(ORG, ["Clarinet"]),
            Recipient::new("r1@example.org").with_groups(ORG, ["Trumpet"]),
            Recipient::new("r2@example.org").with_groups(ORG, ["Trumpet", "Trombone"]),
            Recipient::new("r3@example.org").with_groups(ORG, ["Clarinet"]),
            Recipient::new("r4@example.org").with_groups(ORG, ["Trombone"]),
        ]
    }

    #[test]
    fn test_similar_recipients_are_adjacent() {
        let plan = prepare_emails(ORG, &recipients(), &resources()).unwrap();
        assert_eq!(plan.order, vec![0, 3, 1, 2, 4]);
        let expected: BTreeMap<String, usize> =
            [("clarinet2", 1), ("trumpet1", 3), ("trombone3", 4)].map(|(k, v)| (k.to_string(), v)).into();
        assert_eq!(plan.last_needed, expected);
        assert!(!plan.last_needed.contains_key("bass"));
        assert_eq!(plan.unclaimed().collect::<Vec<_>>(), vec!["bass"]);
    }

    #[test]
    fn test_deterministic() {
        let first = prepare_emails(ORG, &recipients(), &resources()).unwrap();
        for _ in 0..10 {
            assert_eq!(prepare_emails(ORG, &recipients(), &resources()).unwrap(), first);
        }
    }

    #[test]
    fn test_deliveries() {
        let recipients = recipients();
        let plan = prepare_emails(ORG, &recipients, &resources()).unwrap();
        let deliveries: Vec<_> = plan.deliveries(&recipients).collect();
        assert_eq!(deliveries.len(), 5);

        assert_eq!(deliveries[0].recipient.email, "r0@example.org");
        assert_eq!(deliveries[0].attach, vec!["clarinet2"]);
        assert!(deliveries[0].release.is_empty());
        assert_eq!(deliveries[1].release, vec!["clarinet2"]);

        assert_eq!(deliveries[3].recipient.email, "r2@example.org");
        assert_eq!(deliveries[3].attach, vec!["trumpet1", "trombone3"]);
        assert_eq!(deliveries[3].release, vec!["trumpet1"]);
        assert_eq!(deliveries[4].release, vec!["trombone3"]);
        assert!(deliveries.iter().enumerate().all(|(i, d)| d.position == i));
    }

    #[test]
    fn test_recipients_without_needs_are_dropped() {
        let mut recipients = recipients();
        recipients.insert(0, Recipient::new("conductor@example.org"));
        recipients.push(Recipient::new("oboe@example.org").with_groups(ORG, ["Oboe"]));
        recipients.push(Recipient::new("elsewhere@example.org").with_groups("choir", ["Trumpet"]));
        let plan = prepare_emails(ORG, &recipients, &resources()).unwrap();
        assert_eq!(plan.len(), 5);
        assert!(plan.order.iter().all(|&i| (1..=5).contains(&i)));
        assert_eq!(plan.last_needed.values().max(), Some(&4));
    }

    #[test]
    fn test_empty_inputs() {
        let plan = prepare_emails(ORG, &[], &resources()).unwrap();
        assert!(plan.is_empty());
        assert!(plan.last_needed.is_empty());

        let plan = prepare_emails(ORG, &recipients(), &[]).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.deliveries(&recipients()).count(), 0);
    }

    #[test]
    fn test_invalid_inputs() {
        let mut recipients = recipients();
        recipients[2].email = " ".to_string();
        let err = prepare_emails(ORG, &recipients, &resources()).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidRecipient(2));

        let resources = ["horn", "tuba", "horn"].map(String::from);
        let err = prepare_emails(ORG, &[], &resources).unwrap_err();
        assert_eq!(*err, ErrorKind::DuplicateResource("horn".to_string()));
    }
}
