//! State-transition engine.
//!
//! Every operation here follows the same contract: fetch the row inside a
//! fresh transaction, check the supplied version (when one is threaded),
//! check the operation's business rule, then atomically update the
//! accreditation, bump `version`, and append the audit rows. Retried calls
//! append duplicate history/movement rows; the operations are not
//! idempotent and do not pretend to be.

pub mod ops;
