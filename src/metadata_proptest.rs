//! Property-based tests for metadata extraction and write-back.
