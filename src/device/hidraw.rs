//! Non-blocking hidraw reader registered with the tokio reactor.
//!
//! Every successful `read` on a hidraw node returns exactly one input report,
//! so each [`AsyncRead::poll_read`] completion maps to one report (or a
//! truncated one the caller has to discard).

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, ReadBuf};
use tracing::{debug, info};

pub struct HidrawSource {
    fd: AsyncFd<File>,
    path: PathBuf,
}

impl HidrawSource {
    /// Opens `path` read-only. Must be called from within a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;
        let fd = AsyncFd::new(file)?;
        info!("Opened {} for reading", path.display());

        Ok(Self {
            fd,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsyncRead for HidrawSource {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.fd.poll_read_ready(cx))?;

            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| {
                let mut file: &File = inner.get_ref();
                file.read(unfilled)
            }) {
                Ok(Ok(len)) => {
                    buf.advance(len);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(err)) => return Poll::Ready(Err(err)),
                // readiness was stale, wait for the next edge
                Err(_would_block) => continue,
            }
        }
    }
}

impl Drop for HidrawSource {
    fn drop(&mut self) {
        debug!("Closing {}", self.path.display());
    }
}
