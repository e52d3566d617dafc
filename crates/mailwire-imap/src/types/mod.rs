//! Core IMAP types.

mod capability;
mod envelope;
mod flags;
mod mailbox;
mod sequence;

pub use capability::{Capability, Status};
pub use envelope::{EmailAddress, EmailEnvelope, EmailHeader};
pub use flags::{Flag, Flags};
pub use mailbox::{MailboxInfo, MailboxListing};
pub use sequence::SequenceSet;
