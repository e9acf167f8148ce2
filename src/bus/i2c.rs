//! I²C request queue: the queue-based device/bus shape.
//!
//! Grounded on `original_source/stm/i2c.h`. The original's `Request`
//! carries a raw `Device*` and a bitfield `opts` union; here the
//! completion notification is a plain `FnOnce` closure captured at
//! submission (the idiomatic Rust analogue of "pointer back to the
//! calling Device instance, dispatched through a virtual callback"),
//! and `opts` becomes a closed enum instead of a bitfield union, since
//! Rust has no portable bitfield layout guarantee to rely on here.

extern crate alloc;
use alloc::boxed::Box;

use crate::buf::ByteBuf;
use crate::request::{Engine, Request as RequestTrait};

/// What kind of transfer this request performs, mirroring the
/// original's `opts.type` enum (`MASTER_WRITE` .. `MEM_READ`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    MasterWrite,
    MasterRead,
    SlaveWrite,
    SlaveRead,
    MemWrite,
    MemRead,
}

/// An I²C transfer, queued against a [`Bus`].
pub struct Request {
    /// Unshifted 7-bit device address.
    pub address: u8,
    pub transfer: Transfer,
    pub data: ByteBuf,
    /// Memory address byte, used only for [`Transfer::MemWrite`] /
    /// [`Transfer::MemRead`].
    pub mem: u8,
    callback: Box<dyn FnOnce()>,
}

impl Request {
    pub fn new(address: u8, transfer: Transfer, data: ByteBuf, mem: u8, callback: Box<dyn FnOnce()>) -> Self {
        Request {
            address,
            transfer,
            data,
            mem,
            callback,
        }
    }
}

impl RequestTrait for Request {
    fn complete(self) {
        (self.callback)();
    }
}

/// The per-request deadline and actual hardware transfer are supplied
/// by the embedding application (vendor HAL, out of scope here).
pub trait Transport: crate::request::Transport<Request> {}
impl<T: crate::request::Transport<Request>> Transport for T {}

/// An I²C master/slave bus driven by the generic single-flight engine.
pub type Bus<T> = Engine<Request, T>;
