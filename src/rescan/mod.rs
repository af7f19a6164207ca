//! Rescans the catalog when Shotwell writes to it.
//!
//! Shotwell rewrites `photo.db` in bursts. A modification moves the
//! coordinator to `PendingWrite`; the write being closed (or the settle
//! timeout expiring) starts a scan. Notifications that arrive while a scan
//! runs are folded into a single retrigger.

pub mod watcher;

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::scanner::Scanner;
use crate::vfs::{Tree, VirtualFs};

pub use watcher::CatalogWatcher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Modified,
    WriteFinalized,
    Failed(String),
}

/// Work queued behind an in-progress scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retrigger {
    None,
    /// Modified, not yet finalized.
    Pending,
    /// Modified and finalized: scan again as soon as this one ends.
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanState {
    Idle,
    PendingWrite,
    Rescanning { retrigger: Retrigger },
}

impl RescanState {
    pub fn on_notification(self, notification: &Notification) -> Self {
        use RescanState::*;
        match (self, notification) {
            (_, Notification::Failed(_)) => self,
            (Idle | PendingWrite, Notification::Modified) => PendingWrite,
            (Idle, Notification::WriteFinalized) => Idle,
            (PendingWrite, Notification::WriteFinalized) => Rescanning {
                retrigger: Retrigger::None,
            },
            (Rescanning { .. }, Notification::Modified) => Rescanning {
                retrigger: Retrigger::Pending,
            },
            (Rescanning { retrigger }, Notification::WriteFinalized) => Rescanning {
                retrigger: match retrigger {
                    Retrigger::None => Retrigger::None,
                    Retrigger::Pending | Retrigger::Ready => Retrigger::Ready,
                },
            },
        }
    }

    /// No notification arrived within the settle window.
    pub fn on_settled(self) -> Self {
        match self {
            RescanState::PendingWrite => RescanState::Rescanning {
                retrigger: Retrigger::None,
            },
            other => other,
        }
    }

    /// The scan in progress has been published.
    pub fn finish(self) -> Self {
        match self {
            RescanState::Rescanning {
                retrigger: Retrigger::Ready,
            } => RescanState::Rescanning {
                retrigger: Retrigger::None,
            },
            RescanState::Rescanning {
                retrigger: Retrigger::Pending,
            } => RescanState::PendingWrite,
            _ => RescanState::Idle,
        }
    }

    pub fn is_rescanning(self) -> bool {
        matches!(self, RescanState::Rescanning { .. })
    }
}

/// Something that can produce a fresh tree generation.
pub trait Rescan {
    fn rescan(&mut self) -> Result<Tree>;
}

impl Rescan for Scanner {
    fn rescan(&mut self) -> Result<Tree> {
        self.scan()
    }
}

pub struct Coordinator<S> {
    scanner: S,
    vfs: Arc<VirtualFs>,
    settle: Duration,
}

impl<S: Rescan> Coordinator<S> {
    pub fn new(scanner: S, vfs: Arc<VirtualFs>, settle: Duration) -> Self {
        Self { scanner, vfs, settle }
    }

    /// Process notifications until every sender is gone. A failed
    /// notification stream ends the loop with an error; the last published
    /// tree stays active either way.
    pub fn run(mut self, notifications: Receiver<Notification>) -> Result<()> {
        let mut state = RescanState::Idle;
        let mut failure = None;
        let mut disconnected = false;

        while !disconnected && failure.is_none() {
            let received = match state {
                RescanState::PendingWrite => notifications.recv_timeout(self.settle),
                _ => notifications.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            state = match received {
                Ok(Notification::Failed(reason)) => {
                    failure = Some(reason);
                    state
                }
                Ok(notification) => state.on_notification(&notification),
                Err(RecvTimeoutError::Timeout) => {
                    tracing::debug!("No write close seen, rescanning after settle timeout");
                    state.on_settled()
                }
                Err(RecvTimeoutError::Disconnected) => {
                    disconnected = true;
                    state
                }
            };

            while state.is_rescanning() && failure.is_none() {
                self.rescan_once();
                loop {
                    match notifications.try_recv() {
                        Ok(Notification::Failed(reason)) => failure = Some(reason),
                        Ok(notification) => state = state.on_notification(&notification),
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            disconnected = true;
                            break;
                        }
                    }
                }
                state = state.finish();
            }
        }

        match failure {
            Some(reason) => {
                let error = Error::NotificationStreamFailure(reason);
                tracing::error!(error = %error, "Rescans stopped, serving the last tree");
                Err(error)
            }
            None => {
                tracing::info!("Change notifications closed, rescan coordinator exiting");
                Ok(())
            }
        }
    }

    fn rescan_once(&mut self) {
        match self.scanner.rescan() {
            Ok(tree) => {
                let scan_id = tree.scan_id();
                self.vfs.replace(tree);
                tracing::info!(scan_id, "Published scan #{}", scan_id);
            }
            Err(e) => {
                tracing::error!(error = %e, "Rescan failed, keeping the previous tree");
            }
        }
    }
}
