//! Alert dispatch for policywatch.
//!
//! Resolves the route subscriptions matching a detected change,
//! renders the notification email, and sends it through the
//! [`EmailSender`] boundary with per-source accounting.

pub mod engine;
pub mod sender;
pub mod smtp;

pub use engine::{AlertEngine, AlertResult};
pub use sender::{EmailOutcome, EmailSender, NoopSender};
pub use smtp::SmtpSender;
