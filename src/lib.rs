//! Clawgate - a local control plane for the picoclaw gateway
//!
//! This library provides:
//! - A supervisor that starts, stops and restarts the gateway process and
//!   keeps a bounded buffer of its merged output
//! - A mask engine that hides credential values before a config document
//!   leaves the machine
//! - A merge engine that resolves masked placeholders against the stored
//!   document so a UI round trip never destroys a real key
//! - An authenticated HTTP control surface tying the two together

pub mod admin;
pub mod auth;
pub mod config;
pub mod error;
pub mod logs;
pub mod merge;
pub mod secrets;
pub mod status;
pub mod store;
pub mod supervisor;
