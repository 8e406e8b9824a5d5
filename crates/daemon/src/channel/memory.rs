//! In-memory channel driven by a fixed script.
//!
//! Each [`ScriptStep::Data`] is delivered by a single `recv` (split only if
//! the caller's buffer is smaller), which mirrors how a bulk-transfer
//! endpoint hands over one packet per read. Once the script runs out the
//! channel reports [`ChannelError::Closed`].

use std::collections::VecDeque;
use std::io;

use super::{Channel, ChannelError};

/// One scripted event on the receive side.
#[derive(Debug)]
pub enum ScriptStep {
    /// Bytes delivered by the next receive.
    Data(Vec<u8>),
    /// The next receive times out.
    Timeout,
    /// The next receive fails with an I/O error of this kind.
    Fail(io::ErrorKind),
}

/// A [`Channel`] that replays scripted input and records output.
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    script: VecDeque<ScriptStep>,
    sent: Vec<u8>,
    send_budget: Option<usize>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for one receive.
    pub fn push(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.script.push_back(ScriptStep::Data(bytes.into()));
        self
    }

    /// Queue a single command byte.
    pub fn command(self, byte: impl Into<u8>) -> Self {
        self.push(vec![byte.into()])
    }

    /// Queue an arbitrary step.
    pub fn step(mut self, step: ScriptStep) -> Self {
        self.script.push_back(step);
        self
    }

    /// Accept at most `bytes` more bytes of output, then fail sends as if
    /// the peer had reset the connection.
    pub fn fail_sends_after(mut self, bytes: usize) -> Self {
        self.send_budget = Some(bytes);
        self
    }

    /// Everything sent so far.
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    /// Whether every scripted step has been consumed.
    pub fn is_drained(&self) -> bool {
        self.script.is_empty()
    }
}

impl Channel for ScriptedChannel {
    fn send(&mut self, buf: &[u8]) -> Result<usize, ChannelError> {
        let n = match self.send_budget {
            Some(0) => return Err(io::Error::from(io::ErrorKind::ConnectionReset).into()),
            Some(budget) => buf.len().min(budget),
            None => buf.len(),
        };
        if let Some(budget) = self.send_budget.as_mut() {
            *budget -= n;
        }
        self.sent.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        match self.script.pop_front() {
            None => Err(ChannelError::Closed),
            Some(ScriptStep::Timeout) => Err(ChannelError::Timeout),
            Some(ScriptStep::Fail(kind)) => Err(io::Error::from(kind).into()),
            Some(ScriptStep::Data(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.script.push_front(ScriptStep::Data(bytes.split_off(n)));
                }
                Ok(n)
            }
        }
    }
}
