use thiserror::Error;

pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024; // 1 MiB
/// Longest query text kept in search history.
pub const MAX_QUERY_CHARS: usize = 255;
/// Longest category identifier accepted from a click event.
pub const MAX_CATEGORY_CHARS: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimitError {
    #[error("message too large: {actual} bytes (max {max})")]
    TooLarge { max: usize, actual: usize },
    #[error("{what} too long: {actual} characters (max {max})")]
    TooLong {
        what: &'static str,
        max: usize,
        actual: usize,
    },
}

pub type LimitResult<T> = Result<T, LimitError>;

pub fn enforce_max_message_size(len: usize) -> LimitResult<()> {
    if len > MAX_MESSAGE_BYTES {
        return Err(LimitError::TooLarge {
            max: MAX_MESSAGE_BYTES,
            actual: len,
        });
    }
    Ok(())
}

pub fn enforce_max_chars(what: &'static str, value: &str, max: usize) -> LimitResult<()> {
    let actual = value.chars().count();
    if actual > max {
        return Err(LimitError::TooLong { what, max, actual });
    }
    Ok(())
}
