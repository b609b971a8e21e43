/// A type alias for `anyhow::Error`, representing any error type.
///
/// Handler, filter, and hook callbacks surface their failures through this
/// type; the typed error enums of the builder and loader stay separate.
pub type AnyError = anyhow::Error;

/// A type alias for `Result<T, E>` where `E` defaults to [`AnyError`](AnyError).
///
/// # Type Parameters
///
/// * `T` - The type of the successful result.
/// * `E` - The error type, defaulting to [`AnyError`].
pub type AnyResult<T, E = AnyError> = std::result::Result<T, E>;
#[macro_export]
macro_rules! bail_into {
    ($msg:literal $(,)?) => {
        return Err(::anyhow::anyhow!($msg).into())
    };
    ($err:expr $(,)?) => {
        return Err(::anyhow::anyhow!($err).into())
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err(::anyhow::anyhow!($fmt, $($arg)*).into())
    };
}
