use futures::future;
use tokio::sync::mpsc;
use tracing::warn;

/// Operator interrupts (Ctrl-C), delivered as messages instead of unwinding
pub struct Interrupts {
    rx: mpsc::UnboundedReceiver<()>,
}

#[derive(Clone)]
pub struct InterruptSender {
    tx: mpsc::UnboundedSender<()>,
}

impl InterruptSender {
    pub fn interrupt(&self) {
        // A closed channel means nobody is listening anymore
        let _ = self.tx.send(());
    }
}

impl Interrupts {
    /// Listens for SIGINT in the background (must be called from within a tokio runtime)
    pub fn from_signals() -> Self {
        let (sender, interrupts) = Self::channel();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("unable to listen for interrupts: {e}");
                    break;
                }

                if sender.tx.send(()).is_err() {
                    break;
                }
            }
        });

        interrupts
    }

    pub fn channel() -> (InterruptSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (InterruptSender { tx }, Self { rx })
    }

    /// Resolves on the next interrupt; never resolves once all senders are gone
    ///
    /// Cancel safe.
    pub async fn recv(&mut self) {
        if self.rx.recv().await.is_none() {
            future::pending::<()>().await;
        }
    }

    /// Discards interrupts that arrived while nobody was waiting for them
    pub fn clear(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}
