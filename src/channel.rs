//! A communication channel used to send/receive raw bytes to/from another
//! party.
//!
//! The coordinator never interprets the bytes moving over a channel; framing
//! and encoding are the business of the protocol on top (see
//! [`crate::transfer`]). A [`SimpleChannel`] mesh backed by in-process queues
//! is provided for tests and local simulation.

use std::{fmt, future::Future, time::Duration};

use thiserror::Error;
use tokio::{
    sync::mpsc::{Receiver, Sender, channel},
    time::timeout,
};

use crate::cluster::LinkConfig;

/// Errors related to sending or receiving messages over a channel.
#[derive(Debug, Error)]
#[error("channel error during {phase}: {reason}")]
pub struct Error {
    /// The protocol phase during which the error occurred.
    pub phase: String,
    /// The specific error that was raised.
    pub reason: ErrorKind,
}

impl Error {
    pub(crate) fn new(phase: impl Into<String>, reason: ErrorKind) -> Self {
        Error {
            phase: phase.into(),
            reason,
        }
    }
}

/// The specific error that occurred when trying to send or receive a message.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// The message could not be received over the channel.
    #[error("recv failed: {0}")]
    Recv(String),
    /// The message could not be sent over the channel.
    #[error("send failed: {0}")]
    Send(String),
}

/// A communication channel used to send/receive messages to/from another
/// party.
pub trait Channel {
    /// The error that can occur sending messages over the channel.
    type SendError: fmt::Debug;
    /// The error that can occur receiving messages over the channel.
    type RecvError: fmt::Debug;

    /// Sends a message to the party with the given rank (must be between
    /// `0..participants`).
    fn send_bytes_to(
        &mut self,
        party: usize,
        msg: Vec<u8>,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send;

    /// Awaits a message from the party with the given rank (must be between
    /// `0..participants`).
    fn recv_bytes_from(
        &mut self,
        party: usize,
    ) -> impl Future<Output = Result<Vec<u8>, Self::RecvError>> + Send;
}

/// A simple in-process channel mesh using [`Sender`] and [`Receiver`] queues.
#[derive(Debug)]
pub struct SimpleChannel {
    s: Vec<Option<Sender<Vec<u8>>>>,
    r: Vec<Option<Receiver<Vec<u8>>>>,
    recv_timeout: Duration,
}

/// The error raised by `recv` calls of a [`SimpleChannel`].
#[derive(Debug, Error)]
pub enum AsyncRecvError {
    /// The channel has been closed.
    #[error("the channel has been closed")]
    Closed,
    /// No message was received before the timeout.
    #[error("no message was received before the timeout elapsed")]
    TimeoutElapsed,
}

/// The error raised by `send` calls of a [`SimpleChannel`].
#[derive(Debug, Error)]
#[error("the receiving party is gone")]
pub struct AsyncSendError;

impl SimpleChannel {
    /// Creates channels for N parties, with the default 120 second receive
    /// timeout.
    pub fn channels(parties: usize) -> Vec<Self> {
        Self::channels_with_timeout(parties, Duration::from_millis(120 * 1000))
    }

    /// Creates channels for N parties, taking the receive timeout from a
    /// validated link configuration.
    pub fn channels_from_config(parties: usize, config: &LinkConfig) -> Vec<Self> {
        Self::channels_with_timeout(parties, Duration::from_millis(config.recv_timeout_ms))
    }

    /// Creates channels for N parties to communicate with each other, using
    /// the given receive timeout.
    pub fn channels_with_timeout(parties: usize, recv_timeout: Duration) -> Vec<Self> {
        let buffer_capacity = 1024;
        let mut channels = vec![];
        for _ in 0..parties {
            channels.push(SimpleChannel {
                s: (0..parties).map(|_| None).collect(),
                r: (0..parties).map(|_| None).collect(),
                recv_timeout,
            });
        }
        for a in 0..parties {
            for b in 0..parties {
                if a == b {
                    continue;
                }
                let (send_a_to_b, recv_a_to_b) = channel(buffer_capacity);
                channels[a].s[b] = Some(send_a_to_b);
                channels[b].r[a] = Some(recv_a_to_b);
            }
        }
        channels
    }
}

impl Channel for SimpleChannel {
    type SendError = AsyncSendError;
    type RecvError = AsyncRecvError;

    async fn send_bytes_to(&mut self, p: usize, msg: Vec<u8>) -> Result<(), AsyncSendError> {
        let sender = self.s[p]
            .as_ref()
            .unwrap_or_else(|| panic!("no sender for party {p}"));
        sender.send(msg).await.map_err(|_| AsyncSendError)
    }

    async fn recv_bytes_from(&mut self, p: usize) -> Result<Vec<u8>, AsyncRecvError> {
        let receiver = self.r[p]
            .as_mut()
            .unwrap_or_else(|| panic!("no receiver for party {p}"));
        match timeout(self.recv_timeout, receiver.recv()).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(AsyncRecvError::Closed),
            Err(_) => Err(AsyncRecvError::TimeoutElapsed),
        }
    }
}
