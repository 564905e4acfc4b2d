//! Request lifecycle and group formation engine for the tenant connection network.
//!
//! Applicants, peer-support specialists, landlords, and employers reach each other through
//! connection requests. When more than two applicants share a living arrangement the request
//! flow hands over to match groups, whose membership changes require unanimous approval from
//! the members confirmed when an invite was sent.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
