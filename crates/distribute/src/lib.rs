//! Batch distribution of parts to performers.
//!
//! Given the recipients of an organization and the parts of a resource,
//! [`prepare_emails`] picks a sending order that keeps recipients with
//! similar needs next to each other, so a mailer can keep attachments
//! loaded between consecutive emails and drop them once nobody further down
//! the order needs them.

pub mod error;
mod matrix;
mod need;
mod plan;
mod recipient;

pub use matrix::similarity;
pub use need::{instrument_token, label_matches};
pub use plan::{Delivery, Plan, prepare_emails};
pub use recipient::Recipient;
