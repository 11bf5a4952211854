//! Integration tests for Tourney-Harvest
//!
//! HTTP behavior is tested against wiremock servers; engine scenarios use
//! an in-memory fetcher with scripted responses.

mod fetcher_tests;
mod harvest_tests;
