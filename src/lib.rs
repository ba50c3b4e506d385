//! Watch Salesforce DX source and deploy every change through an external CLI.
//!
//! The pieces, leaf first: [`validator`] checks selections against the allowed
//! root, [`watcher`] owns the filesystem watches, [`dispatch`] runs and
//! serializes deploys, and [`session`] ties them into one state machine whose
//! transitions are reported through the [`status`] traits.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod filters;
pub mod output;
pub mod session;
pub mod status;
pub mod validator;
pub mod watcher;
