//! CAN message type and transmit queue.
//!
//! Grounded on `original_source/comm/can.h`: the bus itself is just a
//! `Sink<Message>` (outbound) plus a `Source<Message>` (inbound) — CAN
//! arbitration means there's no per-device single-flight slot the way
//! I²C/SPI/UART need, so [`crate::canopen`] talks to a CAN bus through
//! [`CanBus`] directly rather than through [`crate::request::Engine`].
//! The single-flight engine is still useful for the *transmit* side
//! (one frame handed to the peripheral at a time, with a timeout), so
//! [`Request`]/[`Bus`] are provided for that half.

extern crate alloc;
use alloc::boxed::Box;

use crate::request::{Engine, Request as RequestTrait};
use crate::stream::{Sink, Source};

/// A CAN frame, mirroring `original_source/comm/can.h`'s `Message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub data: u64,
    pub id: u32,
    pub rtr: bool,
    /// Extended (29-bit) identifier in use.
    pub ide: bool,
    pub dlc: u8,
}

impl Message {
    pub fn new(id: u32, data: u64, dlc: u8) -> Self {
        Message {
            data,
            id,
            rtr: false,
            ide: false,
            dlc,
        }
    }

    pub fn rtr(id: u32) -> Self {
        Message {
            data: 0,
            id,
            rtr: true,
            ide: false,
            dlc: 0,
        }
    }

    /// Read byte `i` (0 = least significant) out of `data`. Endianness
    /// inside the payload is the device's concern (`spec.md` §6); this
    /// is a little-endian view of the 64-bit word.
    pub fn byte(&self, i: usize) -> u8 {
        ((self.data >> (i * 8)) & 0xff) as u8
    }
}

/// A full-duplex CAN bus: inbound frames pulled as a [`Source`],
/// outbound frames pushed as a [`Sink`], exactly as `comm/can.h`'s
/// `CAN::CAN` composes both.
pub trait CanBus: Sink<Message> + Source<Message> {}
impl<T: Sink<Message> + Source<Message>> CanBus for T {}

/// A single transmit request against the bus's single-flight transmit
/// queue.
pub struct Request {
    pub message: Message,
    callback: Box<dyn FnOnce()>,
}

impl Request {
    pub fn new(message: Message, callback: Box<dyn FnOnce()>) -> Self {
        Request { message, callback }
    }
}

impl RequestTrait for Request {
    fn complete(self) {
        (self.callback)();
    }
}

pub trait Transport: crate::request::Transport<Request> {}
impl<T: crate::request::Transport<Request>> Transport for T {}

/// A CAN peripheral's transmit side, driven by the generic
/// single-flight engine.
pub type Bus<T> = Engine<Request, T>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn byte_reads_little_endian_lanes() {
        let m = Message::new(0x123, 0x0102_0304_0506_0708, 8);
        assert_eq!(m.byte(0), 0x08);
        assert_eq!(m.byte(7), 0x01);
    }

    #[test]
    fn rtr_frame_carries_no_payload() {
        let m = Message::rtr(0x700);
        assert!(m.rtr);
        assert_eq!(m.dlc, 0);
    }
}
