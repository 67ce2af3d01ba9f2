//! Commit listener and event listener test.
