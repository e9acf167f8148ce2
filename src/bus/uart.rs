//! UART request queue.
//!
//! Grounded on `original_source/stm/uart.h`'s `UARTRequest` shape (tx
//! buffer, expected rx length, opaque callback data), generalized from
//! its older blocking `RequestQueue<T>` base onto the shared
//! [`crate::request::Engine`] per `spec.md` §4.D, exactly as
//! `original_source/stm/i2c.h`'s newer generation already does for I²C.

extern crate alloc;
use alloc::boxed::Box;

use crate::buf::ByteBuf;
use crate::request::{Engine, Request as RequestTrait};

/// A UART transfer: bytes to transmit, and how many bytes of response
/// to expect back (zero for fire-and-forget transmits).
pub struct Request {
    pub tx: ByteBuf,
    pub expected_rx_len: usize,
    callback: Box<dyn FnOnce()>,
}

impl Request {
    pub fn new(tx: ByteBuf, expected_rx_len: usize, callback: Box<dyn FnOnce()>) -> Self {
        Request {
            tx,
            expected_rx_len,
            callback,
        }
    }
}

impl RequestTrait for Request {
    fn complete(self) {
        (self.callback)();
    }
}

pub trait Transport: crate::request::Transport<Request> {}
impl<T: crate::request::Transport<Request>> Transport for T {}

/// A UART peripheral driven by the generic single-flight engine.
pub type Bus<T> = Engine<Request, T>;
