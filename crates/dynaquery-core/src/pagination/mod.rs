//! Cursor-based pagination.
//!
//! [`Paginator`] drives one or more store reads until a page is full or the
//! store is exhausted, and hands back an opaque cursor for the next page.

pub mod cursor;
pub mod engine;

pub use cursor::{CursorError, decode_cursor, encode_cursor, try_decode_cursor};
pub use engine::{EvaluationLimits, Page, PageRequest, Paginator, ReadOperation, ReadRequest};
