/// Return early with an `IllegalArgument` error
#[macro_export]
macro_rules! illegal_argument {
    ($($arg:tt)*) => {
        return Err($crate::error::Error::IllegalArgument(format!($($arg)*)))
    };
}

/// Return early with a `WrongMethodType` error
#[macro_export]
macro_rules! wrong_type {
    ($($arg:tt)*) => {
        return Err($crate::error::Error::WrongMethodType(format!($($arg)*)))
    };
}

/// Return early with an `Internal` error
#[macro_export]
macro_rules! internal {
    ($($arg:tt)*) => {
        return Err($crate::error::Error::Internal(format!($($arg)*)))
    };
}

/// Ensure a combinator precondition holds, or fail with `IllegalArgument`
#[macro_export]
macro_rules! ensure_arg {
    ($cond:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::illegal_argument!($($arg)*);
        }
    };
}

/// Log a warning message
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::tracing::warn!($($arg)*)
    };
}

/// Log a debug message
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::tracing::debug!($($arg)*)
    };
}

/// Log an info message
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::tracing::info!($($arg)*)
    };
}

/// Log an error message
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::tracing::error!($($arg)*)
    };
}

/// Log a trace message
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::tracing::trace!($($arg)*)
    };
}
