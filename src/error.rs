use thiserror::Error;

use crate::{debugger::NativeError, metadata::token::Token};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into four groups, matching the places a debugger core can fail:
///
/// ## Decode Errors
/// - [`Error::Malformed`] - A blob did not follow the expected layout
/// - [`Error::OutOfBounds`] - A read ran past the end of a blob
/// - [`Error::UnsupportedSignatureElement`] - Unknown or forbidden element tag in a signature
/// - [`Error::MalformedAttribute`] - Custom attribute blob with an unexpected prolog
/// - [`Error::RecursionLimit`] - Signature nesting exceeded the decoder limit
///
/// ## Resolution Errors
/// - [`Error::InvalidToken`] - The importer rejected a token that was assumed valid
/// - [`Error::NotFound`] - A named entity (document, method, thread) is unknown
///
/// ## Native Errors
/// - [`Error::Native`] - A native debug-engine call failed, see [`NativeError`]
/// - [`Error::EvaluationTimeout`], [`Error::EvaluationCancelled`],
///   [`Error::EvaluationNotAllowed`] - Function evaluation outcomes
///
/// ## Session Errors
/// - [`Error::SessionTerminated`] - The debuggee is gone
/// - [`Error::AlreadyDisposed`] - The session was torn down twice
/// - [`Error::NotSupported`] - The request cannot be honoured at this point
/// - [`Error::Io`] - The operating system refused a request
///
/// # Examples
///
/// ```rust
/// use corscope::{metadata::signatures::decode_type, Error};
///
/// match decode_type(&[0x3F]) {
///     Err(Error::UnsupportedSignatureElement(tag)) => assert_eq!(tag, 0x3F),
///     other => panic!("unexpected: {:?}", other),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The blob is damaged and could not be decoded.
    ///
    /// The error includes the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while decoding a blob.
    #[error("Out of Bound read would have occurred - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A signature contained an element tag that has no meaning in a type position.
    ///
    /// The associated value is the raw tag byte, after the sentinel bits were stripped.
    #[error("Unsupported signature element type - 0x{0:02X}")]
    UnsupportedSignatureElement(u8),

    /// The importer reported the token as invalid.
    #[error("Invalid token - {0}")]
    InvalidToken(Token),

    /// A custom attribute blob did not start with the `0x0001` prolog.
    ///
    /// The associated value is the prolog that was found instead.
    #[error("Incorrect custom attribute prolog - 0x{0:04X}")]
    MalformedAttribute(u16),

    /// Recursion limit reached.
    ///
    /// Nested signatures are bounded to protect against hostile or corrupt blobs. The associated
    /// value shows the recursion limit that was reached.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// A named entity could not be found.
    #[error("Not found - {0}")]
    NotFound(String),

    /// A native debug-engine call failed.
    #[error("Native debug call failed - {0}")]
    Native(#[from] NativeError),

    /// The evaluation did not finish within the configured timeout and was aborted.
    #[error("Evaluation timed out")]
    EvaluationTimeout,

    /// The evaluation was cancelled because the process or the evaluated object went away.
    #[error("Evaluation was cancelled")]
    EvaluationCancelled,

    /// The debuggee is at a point where function evaluation is illegal.
    #[error("Evaluation is not allowed: {0}")]
    EvaluationNotAllowed(String),

    /// The debuggee process has terminated; the session can no longer continue.
    #[error("The debug session has been terminated")]
    SessionTerminated,

    /// The session was disposed more than once.
    #[error("The debug session was already disposed")]
    AlreadyDisposed,

    /// The requested operation is not supported in the current state.
    #[error("Not supported - {0}")]
    NotSupported(String),

    /// An operating system call failed, such as spawning the helper thread.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}
