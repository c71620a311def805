use thiserror::Error;

/// Failures on the transport/collaborator plane.
///
/// These are distinct from request statuses: a request that cannot be
/// satisfied still completes with a [`crate::Status`], while a
/// `DeviceError` means the packet itself could not be moved between the
/// server and the driver and the connection should be torn down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("transport error in {context}: code {code}")]
    Transport { context: String, code: u32 },

    #[error("host I/O error in {context}: code {code}")]
    HostIo { context: String, code: u32 },
}

impl DeviceError {
    pub fn transport(context: impl Into<String>, code: u32) -> Self {
        Self::Transport {
            context: context.into(),
            code,
        }
    }

    pub fn host_io(context: impl Into<String>, code: u32) -> Self {
        Self::HostIo {
            context: context.into(),
            code,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
