//! Framework-neutral change notification.
//!
//! Every owner bumps its revision after a visible state change. A host UI
//! awaits `changed()` on the receiver and re-renders; nothing here depends
//! on a particular framework.

use tokio::sync::watch;

#[derive(Debug)]
pub(crate) struct Revision {
    tx: watch::Sender<u64>,
}

impl Revision {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    pub(crate) fn bump(&self) {
        self.tx.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}
