use crate::device::LocatorError;
use crate::output::SinkError;
use std::path::PathBuf;
use std::time::Duration;

/// Fatal conditions of a bridge run. Short reads and cancellation are not
/// errors and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("No hidraw device matches {vendor_id:04x}:{product_id:04x}")]
    SourceNotFound { vendor_id: u16, product_id: u16 },

    #[error("Device lookup failed: {0}")]
    Locator(#[from] LocatorError),

    #[error("Failed to open {path}: {source}")]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    SinkCreation(#[source] SinkError),

    #[error("{path} disappeared")]
    SourceDeviceGone { path: PathBuf },

    #[error("Failed to read from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} reached end of stream")]
    EndOfStream { path: PathBuf },

    #[error("No report from source for {0:?}")]
    ReadTimeout(Duration),

    #[error("Gave up after {0} consecutive short reads")]
    TooManyShortReads(u32),

    #[error("{0}")]
    Emit(#[source] SinkError),

    #[error("Bridge handles were already released")]
    Released,
}

impl BridgeError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            BridgeError::SourceNotFound { .. } => 2,
            BridgeError::SinkCreation(_) => 3,
            BridgeError::SourceDeviceGone { .. } => 4,
            BridgeError::SourceOpen { .. }
            | BridgeError::Read { .. }
            | BridgeError::EndOfStream { .. }
            | BridgeError::ReadTimeout(_)
            | BridgeError::TooManyShortReads(_)
            | BridgeError::Released => 5,
            BridgeError::Emit(_) => 6,
            BridgeError::Locator(_) => 7,
        }
    }

    /// Maps a failed read to the taxonomy: a vanished node is its own
    /// category, everything else is a generic read failure.
    ///
    /// An unplugged hidraw device fails pending reads with `EIO` and its node
    /// is removed before the reader wakes up, so `EIO` counts as gone once
    /// `path` no longer exists.
    pub fn from_read(path: PathBuf, source: std::io::Error) -> Self {
        let gone = match source.raw_os_error() {
            Some(libc::ENODEV) => true,
            Some(libc::EIO) => !matches!(path.try_exists(), Ok(true)),
            _ => source.kind() == std::io::ErrorKind::NotFound,
        };
        if gone {
            BridgeError::SourceDeviceGone { path }
        } else {
            BridgeError::Read { path, source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tempfile::NamedTempFile;

    fn from_errno(path: PathBuf, errno: i32) -> BridgeError {
        BridgeError::from_read(path, io::Error::from_raw_os_error(errno))
    }

    #[test]
    fn vanished_device_is_classified() {
        let path = PathBuf::from("/dev/hidraw-unplugged");
        let enodev = from_errno(path.clone(), libc::ENODEV);
        assert!(matches!(enodev, BridgeError::SourceDeviceGone { .. }));

        let enoent = BridgeError::from_read(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(enoent, BridgeError::SourceDeviceGone { .. }));
    }

    #[test]
    fn eio_after_unplug_is_device_gone() {
        let node = NamedTempFile::new().unwrap();
        let path = node.path().to_path_buf();

        let present = from_errno(path.clone(), libc::EIO);
        assert!(matches!(present, BridgeError::Read { .. }));
        assert_eq!(present.exit_code(), 5);

        node.close().unwrap();
        let removed = from_errno(path, libc::EIO);
        assert!(matches!(removed, BridgeError::SourceDeviceGone { .. }));
        assert_eq!(removed.exit_code(), 4);
    }

    #[test]
    fn other_errors_stay_read_failures() {
        let path = PathBuf::from("/dev/hidraw-unplugged");
        assert!(matches!(
            from_errno(path.clone(), libc::EPROTO),
            BridgeError::Read { .. }
        ));
        let denied = BridgeError::from_read(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(denied, BridgeError::Read { .. }));
    }

    #[test]
    fn fatal_categories_have_distinct_exit_codes() {
        let not_found = BridgeError::SourceNotFound {
            vendor_id: 0x04b4,
            product_id: 0x2412,
        };
        let creation = BridgeError::SinkCreation(SinkError::Create(io::Error::from(
            io::ErrorKind::PermissionDenied,
        )));
        let gone = BridgeError::SourceDeviceGone {
            path: PathBuf::from("/dev/hidraw0"),
        };
        let read = BridgeError::ReadTimeout(Duration::from_secs(1));

        let codes = [
            not_found.exit_code(),
            creation.exit_code(),
            gone.exit_code(),
            read.exit_code(),
        ];
        assert_eq!(codes, [2, 3, 4, 5]);
        assert!(codes.iter().all(|&code| code != 0 && code != 1));
        assert_eq!(not_found.to_string(), "No hidraw device matches 04b4:2412");
    }
}
