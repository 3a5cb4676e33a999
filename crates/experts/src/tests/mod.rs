//! Cross-module scenario tests.

mod support;

mod lifecycle;
mod matching_tiers;
