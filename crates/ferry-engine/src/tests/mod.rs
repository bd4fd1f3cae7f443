//! Tests for the ferry-engine crate.

mod helpers;

mod reconcile;
