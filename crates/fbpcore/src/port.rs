//! Ports and the channels behind them
//!
//! A component declares its ports with [`PortSpec`]. The graph creates the
//! transport channel for every connection and hands the component an
//! [`InPort`] or [`OutPort`] for each declared port once the network runs.

use crate::component::ComponentStatus;
use crate::{ComponentError, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    In,
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "input"),
            Direction::Out => write!(f, "output"),
        }
    }
}

/// Role a port plays in `Network::connect(sender, receiver)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortRole {
    Sender,
    Receiver,
}

impl fmt::Display for PortRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortRole::Sender => write!(f, "sender"),
            PortRole::Receiver => write!(f, "receiver"),
        }
    }
}

/// Channel capacity of a connection.
///
/// `Unbuffered` is a rendezvous: a send completes only once the receiver
/// has taken the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Capacity {
    #[default]
    Unbuffered,
    Bounded(usize),
}

impl Capacity {
    fn slots(self) -> usize {
        match self {
            Capacity::Unbuffered => 1,
            Capacity::Bounded(n) => n.max(1),
        }
    }

    fn is_rendezvous(self) -> bool {
        matches!(self, Capacity::Unbuffered)
    }
}

/// One entry of a component's capability listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub name: String,
    pub direction: Direction,
    /// Endpoint used by `Network::connect` for this direction.
    pub primary: bool,
    /// Exported at the network boundary under the component's name.
    pub exported: bool,
    pub capacity: Option<Capacity>,
}

impl PortSpec {
    pub fn input(name: impl Into<String>) -> Self {
        Self::new(name, Direction::In)
    }

    pub fn output(name: impl Into<String>) -> Self {
        Self::new(name, Direction::Out)
    }

    fn new(name: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            direction,
            primary: false,
            exported: false,
            capacity: None,
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn exported(mut self) -> Self {
        self.exported = true;
        self
    }

    pub fn with_capacity(mut self, slots: usize) -> Self {
        self.capacity = Some(Capacity::Bounded(slots));
        self
    }

    pub fn unbuffered(mut self) -> Self {
        self.capacity = Some(Capacity::Unbuffered);
        self
    }

    pub fn role(&self) -> Option<PortRole> {
        if !self.primary {
            return None;
        }
        Some(match self.direction {
            Direction::In => PortRole::Receiver,
            Direction::Out => PortRole::Sender,
        })
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("channel closed")]
pub struct ChannelClosed;

#[derive(Debug)]
struct Envelope {
    value: Value,
    ack: Option<oneshot::Sender<()>>,
}

/// Create a transport channel. Callers use this for externally bound ports.
pub fn channel(capacity: Capacity) -> (Sender, Receiver) {
    let (tx, rx) = mpsc::channel(capacity.slots());
    (
        Sender {
            inner: tx,
            rendezvous: capacity.is_rendezvous(),
        },
        Receiver { inner: rx },
    )
}

/// Sending half. The channel closes once every clone is dropped.
#[derive(Debug, Clone)]
pub struct Sender {
    inner: mpsc::Sender<Envelope>,
    rendezvous: bool,
}

impl Sender {
    pub async fn send(&self, value: impl Into<Value>) -> Result<(), ChannelClosed> {
        let value = value.into();
        if !self.rendezvous {
            return self
                .inner
                .send(Envelope { value, ack: None })
                .await
                .map_err(|_| ChannelClosed);
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        self.inner
            .send(Envelope {
                value,
                ack: Some(ack_tx),
            })
            .await
            .map_err(|_| ChannelClosed)?;
        // An envelope dropped unread (receiver gone) drops the ack too.
        ack_rx.await.map_err(|_| ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[derive(Debug)]
pub struct Receiver {
    inner: mpsc::Receiver<Envelope>,
}

impl Receiver {
    /// Next message, or `None` once all senders are gone and the buffer is empty.
    pub async fn recv(&mut self) -> Option<Value> {
        let envelope = self.inner.recv().await?;
        if let Some(ack) = envelope.ack {
            let _ = ack.send(());
        }
        Some(envelope.value)
    }
}

/// Input side of a port, as seen by a running component.
#[derive(Debug)]
pub struct InPort {
    name: String,
    receiver: Option<Receiver>,
    status: Option<Arc<ComponentStatus>>,
    cancellation: CancellationToken,
}

impl InPort {
    pub fn new(name: impl Into<String>, receiver: Option<Receiver>) -> Self {
        Self {
            name: name.into(),
            receiver,
            status: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Report closure of this port to the owning component's status.
    pub fn tracked(mut self, status: Arc<ComponentStatus>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.receiver.is_some()
    }

    /// Wait for the next message.
    ///
    /// Returns `None` when the upstream side closed, when the port was never
    /// bound, or when the network was cancelled. Once `None` is returned it is
    /// returned forever.
    pub async fn recv(&mut self) -> Option<Value> {
        let next = match self.receiver.as_mut() {
            Some(receiver) => tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => None,
                value = receiver.recv() => value,
            },
            None => return None,
        };
        if next.is_none() {
            self.mark_closed();
        }
        next
    }

    fn mark_closed(&mut self) {
        if self.receiver.take().is_some() {
            tracing::trace!(port = %self.name, "input closed");
            if let Some(status) = &self.status {
                status.input_closed();
            }
        }
    }
}

/// Output side of a port. Every message is broadcast to each connection.
#[derive(Debug)]
pub struct OutPort {
    name: String,
    senders: Vec<Sender>,
    cancellation: CancellationToken,
}

impl OutPort {
    pub fn new(name: impl Into<String>, senders: Vec<Sender>) -> Self {
        Self {
            name: name.into(),
            senders,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        !self.senders.is_empty()
    }

    pub fn receiver_count(&self) -> usize {
        self.senders.len()
    }

    /// Send to every connected receiver in connection order.
    ///
    /// Messages on an unconnected port are discarded. Receivers that have
    /// gone away are pruned; once none remain the port reports `PortClosed`.
    pub async fn send(&mut self, value: impl Into<Value>) -> Result<(), ComponentError> {
        let value = value.into();
        if self.senders.is_empty() {
            tracing::trace!(port = %self.name, "discarding message on unconnected port");
            return Ok(());
        }

        let mut gone = Vec::new();
        for (idx, sender) in self.senders.iter().enumerate() {
            let delivered = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => return Err(ComponentError::Cancelled),
                result = sender.send(value.clone()) => result,
            };
            if delivered.is_err() {
                gone.push(idx);
            }
        }

        if !gone.is_empty() {
            let mut idx = 0;
            self.senders.retain(|_| {
                let keep = !gone.contains(&idx);
                idx += 1;
                keep
            });
            if self.senders.is_empty() {
                return Err(ComponentError::PortClosed(self.name.clone()));
            }
        }
        Ok(())
    }
}
