//! Best-effort stop signal passed from a caller to the work it started.

use tokio::sync::watch;

/// Receiving half: observed by update work before it starts anything new.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal fires. Pends forever if it never can.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                if *self.rx.borrow() {
                    return;
                }
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Sending half. Fires when dropped, so an abandoned caller cancels its work.
#[derive(Debug)]
pub struct CancelOnDrop {
    tx: watch::Sender<bool>,
}

impl CancelOnDrop {
    pub fn new() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelSignal { rx })
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.tx.send_replace(true);
    }
}
