use core::fmt;

/// Errors surfaced by this crate.
///
/// [`Error::PortRange`] and [`Error::Config`] are both configuration
/// mistakes and are always reported synchronously at the offending call.
/// [`Error::Comm`] is an I/O failure of the underlying bus or pin driver;
/// no retry is ever performed by this layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A port number outside the device's valid numbering.
    #[error("port number {number} is out of range [1, {max}]")]
    PortRange {
        /// The number that was requested.
        number: u8,
        /// Highest valid port number on the device.
        max: u8,
    },
    /// Invalid address, reserved pin, or a direction/value operation that
    /// the port's current configuration does not allow.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Bus or pin I/O failure reported by the collaborator driver.
    #[error("device communication failed: {0}")]
    Comm(String),
}

impl Error {
    /// Wrap a collaborator driver error into [`Error::Comm`].
    pub(crate) fn comm(err: impl fmt::Debug) -> Self {
        Error::Comm(format!("{err:?}"))
    }

    /// `true` for errors caused by how the caller configured or addressed
    /// a port, as opposed to hardware I/O failures.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::PortRange { .. } | Error::Config(_))
    }
}

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_range_message_names_valid_range() {
        let err = Error::PortRange { number: 17, max: 16 };
        assert_eq!(
            err.to_string(),
            "port number 17 is out of range [1, 16]"
        );
        assert!(err.is_configuration());
    }

    #[test]
    fn comm_errors_are_not_configuration() {
        assert!(!Error::comm("nack").is_configuration());
    }
}
