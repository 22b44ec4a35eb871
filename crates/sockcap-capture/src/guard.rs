use errno::{errno, set_errno, Errno};

/// Snapshot of the calling thread's host error indicator.
///
/// The value captured on construction is written back when the guard drops,
/// whatever happened in between.
///
/// On Unix this is the thread's `errno`. On Windows the `errno` crate maps it
/// onto `GetLastError`/`SetLastError`, which is also what `WSAGetLastError`
/// reads. The C runtime's separate `errno` is not saved there: nothing in this
/// crate calls into the CRT on Windows, since [`HostSocketResolver`] only
/// queries the host on Unix and reports `Unsupported` elsewhere.
///
/// [`HostSocketResolver`]: crate::HostSocketResolver
#[derive(Debug)]
#[must_use = "the error state is restored when the guard drops"]
pub struct ErrorStateGuard {
    saved: Errno,
}

impl ErrorStateGuard {
    pub fn capture() -> Self {
        Self { saved: errno() }
    }

    pub fn saved(&self) -> i32 {
        self.saved.0
    }
}

impl Drop for ErrorStateGuard {
    fn drop(&mut self) {
        set_errno(self.saved);
    }
}
