//! Server error codes the driver doesn't name.

use mongodb::error::{Error as DbError, ErrorKind, WriteFailure};

/// A unique index rejected the write.
const DUPLICATE_KEY: i32 = 11000;

/// The server error code of a failed single-document write, if that's what this is.
fn write_error_code(err: &DbError) -> Option<i32> {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => Some(e.code),
        _ => None,
    }
}

/// Did a unique index reject this write?
pub fn is_duplicate_key_error(err: &DbError) -> bool {
    write_error_code(err) == Some(DUPLICATE_KEY)
}
