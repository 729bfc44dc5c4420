use lockcrab::StoreError;
use redis::{ErrorKind, RedisError};

pub type Result<T> = std::result::Result<T, StoreError>;

/// Map a redis client error onto the store contract
pub(crate) fn store_error(e: RedisError) -> StoreError {
    if e.is_timeout() {
        return StoreError::Timeout;
    }

    let message = e.to_string();
    if e.code() == Some("WRONGTYPE")
        || message.contains("WRONGTYPE")
        || message.contains("not an integer")
    {
        return StoreError::WrongType(message);
    }

    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        return StoreError::Unavailable(message);
    }

    match e.kind() {
        ErrorKind::AuthenticationFailed | ErrorKind::BusyLoadingError | ErrorKind::MasterDown => {
            StoreError::Unavailable(message)
        }
        _ => StoreError::Protocol(message),
    }
}
