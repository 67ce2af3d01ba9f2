//! End-to-end session test.
