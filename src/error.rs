use crate::control::state::{FlightState, Request};

/// [Result] alias for return types of the crate API
pub type Result<T> = std::result::Result<T, Error>;

/// Error enum type
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The flow deck was not confirmed attached before the sensor timeout.
    ///
    /// Fatal to startup. Nothing has been armed when this is returned.
    SensorTimeout,
    /// A single command to the flight sink failed. The String contains the reason.
    CommandFailure(String),
    /// A transition was requested from a state that does not permit it.
    ///
    /// Only produced by [transition](crate::control::state::transition), the
    /// state machine logs and swallows it.
    InvalidTransition {
        /// State the machine was in
        from: FlightState,
        /// Rejected request
        request: Request,
    },
    /// A land command did not complete within its bound.
    ///
    /// The vehicle may still be airborne: it is left in `Landing` or `Emergency` and is not disarmed.
    ShutdownTimeout,
    /// A channel or the link uplink is closed.
    Disconnected,
    /// Invalid configuration. The String contains the reason.
    ConfigError(String),
    /// Parameter error, unknown name or type mismatch. The String contains the reason.
    ParamError(String),
    /// Log error, unknown variable or block refused by the Crazyflie. The String contains the reason.
    LogError(String),
    /// Unexpected packet content from the Crazyflie. The String contains the reason.
    ProtocolError(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::SensorTimeout => write!(f, "flow deck not detected before timeout"),
            Error::CommandFailure(reason) => write!(f, "flight command failed: {}", reason),
            Error::InvalidTransition { from, request } => {
                write!(f, "cannot apply {:?} while {:?}", request, from)
            }
            Error::ShutdownTimeout => write!(f, "landing not confirmed before timeout"),
            Error::Disconnected => write!(f, "disconnected"),
            Error::ConfigError(reason) => write!(f, "configuration error: {}", reason),
            Error::ParamError(reason) => write!(f, "param error: {}", reason),
            Error::LogError(reason) => write!(f, "log error: {}", reason),
            Error::ProtocolError(reason) => write!(f, "protocol error: {}", reason),
        }
    }
}

impl std::error::Error for Error {}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::CommandFailure("command timed out".to_owned())
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::ConfigError(format!("{}", error))
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::ConfigError(format!("{}", error))
    }
}

impl From<flume::RecvError> for Error {
    fn from(_: flume::RecvError) -> Self {
        self::Error::Disconnected
    }
}

impl<T> From<flume::SendError<T>> for Error {
    fn from(_: flume::SendError<T>) -> Self {
        self::Error::Disconnected
    }
}

impl From<crazyflie_link::Error> for Error {
    fn from(error: crazyflie_link::Error) -> Self {
        Self::CommandFailure(format!("{:?}", error))
    }
}
