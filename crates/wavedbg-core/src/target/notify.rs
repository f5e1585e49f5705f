//! Notifier handling and async mode.
//!
//! Each attached session owns a notifier descriptor the library makes
//! readable whenever it has events. Once the adapter is published those
//! wakeups are folded into one shared async event that makes the core call
//! `wait`; before that, the only event that can arrive is the runtime
//! load that publishes it.

use tracing::debug;

use crate::error::{Result, TargetError};
use crate::library::{EventKind, NotifierFd};
use crate::ptid::Pid;

use super::{ASYNC_EVENT_NAME, GpuTarget, NOTIFIER_HANDLER_NAME};

impl GpuTarget {
    /// The notifier of `pid` became readable.
    pub fn handle_notifier(&mut self, pid: Pid) -> Result<()> {
        let Some(session) = self.sessions.get(pid) else {
            return Ok(());
        };
        let Some(attachment) = session.attachment() else {
            return Ok(());
        };

        drain_notifier(attachment.notifier);

        if session.is_published() {
            // Consumed through `wait`.
            self.mark_async_event();
            return Ok(());
        }

        let (lib, mut callbacks) = self.split();
        let next = lib
            .next_pending_event(Some(attachment.process), &mut callbacks)
            .map_err(|status| TargetError::library("next_pending_event", status))?;
        let Some((event, kind)) = next else {
            return Ok(());
        };
        debug!(pid, event_id = %event, %kind, "pulled library event before publishing");

        let result = if kind == EventKind::Runtime {
            match self.lib.event_runtime_state(event) {
                Ok(state) => self.apply_runtime_state(pid, state),
                Err(status) => Err(TargetError::library("event_runtime_state", status)),
            }
        } else {
            Err(TargetError::UnexpectedEvent {
                event,
                kind,
                context: "before the runtime is loaded",
            })
        };
        self.acknowledge(event);
        result
    }

    /// Enable or disable async mode, here and beneath.
    ///
    /// Enabling registers every session's notifier with the event loop and
    /// creates the shared async event, marked once since events may
    /// already be buffered. Both directions are idempotent.
    pub fn set_async(&mut self, enable: bool) {
        self.beneath.set_async(enable);

        if enable {
            if self.async_event.is_some() {
                return;
            }
            for session in self.sessions.iter() {
                if let Some(fd) = session.notifier() {
                    self.core
                        .add_file_handler(fd, session.pid(), NOTIFIER_HANDLER_NAME);
                }
            }
            let event = self.core.create_async_event(ASYNC_EVENT_NAME);
            self.core.mark_async_event(event);
            self.async_event = Some(event);
            debug!("async mode enabled");
        } else {
            let Some(event) = self.async_event.take() else {
                return;
            };
            for session in self.sessions.iter() {
                if let Some(fd) = session.notifier() {
                    self.core.delete_file_handler(fd);
                }
            }
            self.core.delete_async_event(event);
            debug!("async mode disabled");
        }
    }

    /// Record whether thread-exit events are wanted, here and beneath.
    pub fn thread_events(&mut self, enable: bool) {
        self.report_thread_events = enable;
        self.beneath.thread_events(enable);
    }
}

/// Consume every pending wakeup byte on `fd`.
///
/// The descriptor is non-blocking; the loop stops at the first read that
/// would block, fails or hits end of file.
#[cfg(unix)]
pub(crate) fn drain_notifier(fd: NotifierFd) {
    let mut buf = [0u8; 64];
    loop {
        // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
        let ret = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if ret > 0 {
            continue;
        }
        if ret < 0 && std::io::Error::last_os_error().kind() == std::io::ErrorKind::Interrupted {
            continue;
        }
        break;
    }
}

#[cfg(not(unix))]
pub(crate) fn drain_notifier(_fd: NotifierFd) {}
