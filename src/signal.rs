use std::future::poll_fn;
use std::task::Poll;

use tokio::signal::unix::{Signal, SignalKind, signal};

/// Control messages derived from OS signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalTo {
    /// Stop polling, let in-flight work finish, then exit.
    Shutdown,
    /// Exit immediately.
    Quit,
}

pub struct Signals {
    sigint: Signal,
    sigterm: Signal,
    sigquit: Signal,
}

impl Signals {
    pub fn new() -> std::io::Result<Self> {
        Ok(Signals {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
            sigquit: signal(SignalKind::quit())?,
        })
    }

    pub async fn recv(&mut self) -> SignalTo {
        poll_fn(|cx| {
            if self.sigint.poll_recv(cx).is_ready() {
                info!(message = "Signal received", signal = "SIGINT");
                return Poll::Ready(SignalTo::Shutdown);
            }

            if self.sigterm.poll_recv(cx).is_ready() {
                info!(message = "Signal received", signal = "SIGTERM");
                return Poll::Ready(SignalTo::Shutdown);
            }

            if self.sigquit.poll_recv(cx).is_ready() {
                info!(message = "Signal received", signal = "SIGQUIT");
                return Poll::Ready(SignalTo::Quit);
            }

            Poll::Pending
        })
        .await
    }
}
