//! CANopen dispatch layer on top of a raw CAN bus.
//!
//! Grounded on `original_source/comm/canopen.h`: [`Dispatch`] sits
//! between a [`crate::bus::can::CanBus`] and per-node [`Device`]s,
//! translating `Message`s to/from [`Sdo`]/[`Tpdo`] and routing by COB
//! id. The original's `ids[128]`/`pdo.dev[8]` are raw `Sink<T>*` arrays
//! into objects the caller guarantees outlive `Dispatch`; here they're
//! `Box<dyn FnMut>` slots plus `Rc<RefCell<Device>>` for shared
//! ownership, the same pattern `FrameRegistry` (`crate::min`) and the
//! scheduler registries (`crate::schedule`) already use for "call this
//! thing later, from somewhere else" without unsafe pointers.

extern crate alloc;
use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::bus::can::{CanBus, Message};
use crate::buf::ByteBuf;
use crate::deadline::Deadline;
use crate::logger::{Logger, NoPreamble};
use crate::queue::Queue;
use crate::stream::Source;

/// CANopen Network Management commands (`spec.md`'s Supplement F).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nmt {
    Start = 1,
    Stop = 2,
    Preop = 0x80,
    ResetApp = 0x81,
    ResetComm = 0x82,
}

/// CANopen device states, as reported in a HEARTBEAT message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Stopped = 4,
    Operational = 5,
    Preop = 0x7f,
}

/// An SDO transfer request/response. Not normally built directly;
/// [`Device::read`]/[`Device::w8`]/[`Device::w16`]/[`Device::w32`]
/// build these for you.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sdo {
    pub data: u32,
    pub ix: u16,
    pub sub: u8,
    pub cmd: u8,
    pub node_id: u8,
}

impl Sdo {
    pub fn to_message(self) -> Message {
        let data = self.cmd as u64 | (self.ix as u64) << 8 | (self.sub as u64) << 24 | (self.data as u64) << 32;
        Message::new(0x600 + self.node_id as u32, data, 8)
    }

    pub fn from_message(msg: Message) -> Self {
        Sdo {
            data: (msg.data >> 32) as u32,
            ix: (msg.data >> 8) as u16,
            sub: (msg.data >> 24) as u8,
            cmd: msg.data as u8,
            node_id: (msg.id % 0x80) as u8,
        }
    }
}

/// One entry in a PDO's data map: which Data Object, and how many bits
/// of it this slot carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PdoMap {
    pub ix: u16,
    pub sub: u8,
    pub len: u8,
    pub data: i32,
}

/// When a PDO is transmitted/expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdoType {
    /// On every NMT SYNC message.
    Sync,
    /// After `inhibit_time` has elapsed.
    Cyclic,
    /// As soon as possible after a mapped value changes.
    Change,
}

impl PdoType {
    fn wire(self) -> u8 {
        match self {
            PdoType::Sync => 0,
            PdoType::Cyclic => 254,
            PdoType::Change => 255,
        }
    }
}

/// A receive Process Data Object: the device pushes us a packed word,
/// we unpack it into `map`.
#[derive(Debug, Clone)]
pub struct Rpdo {
    pub n: u8,
    pub kind: PdoType,
    /// CAN Object id. `0` means "derive the default from node id and
    /// `n`", same as the original.
    pub cob: u32,
    pub map: Vec<PdoMap>,
}

impl Rpdo {
    /// Pack `map` into the wire [`Message`] to send, per `spec.md`'s PDO
    /// bit-packing rule: each entry occupies `len` bits starting right
    /// after the previous one, in map order.
    pub fn to_message(&self) -> Message {
        let mut data = 0u64;
        let mut shift = 0u32;
        for entry in &self.map {
            let mask = (1u64 << entry.len) - 1;
            data |= (entry.data as u64 & mask) << shift;
            shift += entry.len as u32;
        }
        Message::new(self.cob, data, (shift / 8) as u8)
    }
}

/// A transmit Process Data Object: we unpack an inbound wire word into
/// `map` on receipt.
#[derive(Debug, Clone)]
pub struct Tpdo {
    pub n: u8,
    pub kind: PdoType,
    pub cob: u32,
    /// Inhibit time between transmissions, in 0.1ms steps.
    pub inhibit_time: u32,
    pub map: Vec<PdoMap>,
}

impl Tpdo {
    pub fn receive(&mut self, d: u64) {
        let mut shift = 0u32;
        for entry in &mut self.map {
            let mask = (1u64 << entry.len) - 1;
            entry.data = ((d >> shift) & mask) as i32;
            shift += entry.len as u32;
        }
    }
}

type SdoHandler = Box<dyn FnMut(Sdo, u32)>;
type TpdoHandler = Box<dyn FnMut(&Tpdo)>;

/// Middle layer between a raw [`CanBus`] and the node [`Device`]s that
/// speak CANopen over it. Owns the bus; call [`Dispatch::process`]
/// once per poll with the current time, right after draining the bus's
/// own interrupt/receive path.
pub struct Dispatch {
    can: Box<dyn CanBus>,
    sdo_devices: Vec<Option<SdoHandler>>,
    pdo_devices: Vec<(Rc<RefCell<Tpdo>>, TpdoHandler)>,
    log: Logger<NoPreamble>,
}

impl Dispatch {
    pub fn new(can: Box<dyn CanBus>, log_sink: Box<dyn crate::stream::Sink<ByteBuf>>) -> Self {
        let mut sdo_devices = Vec::with_capacity(128);
        sdo_devices.resize_with(128, || None);
        Dispatch {
            can,
            sdo_devices,
            pdo_devices: Vec::new(),
            log: Logger::new(log_sink, NoPreamble, 128),
        }
    }

    /// Send an NMT command to `node_id` (`0` broadcasts to the whole
    /// network).
    pub fn nmt(&mut self, command: Nmt, node_id: u8) {
        let data = ((node_id & 0x7f) as u64) << 8 | command as u64;
        self.can.push(Message::new(0, data, 2));
    }

    /// Broadcast a SYNC message.
    pub fn sync(&mut self) {
        self.can.push(Message::new(0x80, 0, 0));
    }

    /// Report this node's own state to `id` via a HEARTBEAT message.
    pub fn heartbeat(&mut self, id: u8, state: NodeState) {
        self.can.push(Message::new(0x700 + id as u32, state as u64, 1));
    }

    /// Send a remote-frame GUARD request to `id`.
    pub fn guard(&mut self, id: u8) {
        self.can.push(Message::rtr(0x700 + id as u32));
    }

    /// Drain every inbound CAN message, routing PDOs and SDOs to their
    /// registered device, and logging anything unrecognized.
    pub fn process(&mut self, now: u32) {
        while !self.can.empty() {
            let msg = self.can.pop();
            if self.handle_pdo(msg) {
                continue;
            }
            if self.handle_sdo(msg, now) {
                continue;
            }
            self.log.warn(core::format_args!(
                "unhandled CAN message id=0x{:x} data=0x{:016x}",
                msg.id,
                msg.data
            ));
        }
    }

    /// Route an outbound SDO request through the bus, after confirming
    /// its node id has a registered [`Device`].
    pub(crate) fn push_sdo(&mut self, sdo: Sdo) {
        if !matches!(self.sdo_devices.get(sdo.node_id as usize), Some(Some(_))) {
            self.log.warn(core::format_args!("CANopen node 0x{:x} not registered", sdo.node_id));
            return;
        }
        self.can.push(sdo.to_message());
    }

    /// Send a raw `Message`, bypassing the SDO/PDO translation layer.
    pub fn push_message(&mut self, msg: Message) {
        self.can.push(msg);
    }

    /// Register the handler that receives SDO responses addressed to
    /// `node_id`. [`Device::new`] calls this for you.
    ///
    /// # Panics
    /// Panics if `node_id` is `0` (broadcast, not a device) or already
    /// registered.
    pub fn register_sdo(&mut self, node_id: u8, handler: SdoHandler) {
        assert!(node_id != 0, "Dispatch::register_sdo: node id 0 is not a device");
        let slot = &mut self.sdo_devices[node_id as usize];
        assert!(slot.is_none(), "Dispatch::register_sdo: node 0x{node_id:x} already registered");
        *slot = Some(handler);
    }

    /// Register `handler` to receive decoded values every time `tpdo`
    /// is updated from the wire. Re-registering the same `tpdo` handle
    /// is a no-op (matches the original's idempotent `registerPDO`).
    ///
    /// # Panics
    /// Panics if 8 TPDOs are already registered.
    pub fn register_pdo(&mut self, tpdo: Rc<RefCell<Tpdo>>, handler: TpdoHandler) {
        if self.pdo_devices.iter().any(|(t, _)| Rc::ptr_eq(t, &tpdo)) {
            return;
        }
        assert!(self.pdo_devices.len() < 8, "Dispatch::register_pdo: at most 8 TPDOs supported");
        self.pdo_devices.push((tpdo, handler));
    }

    fn handle_pdo(&mut self, msg: Message) -> bool {
        for (tpdo, handler) in &mut self.pdo_devices {
            let cob_matches = tpdo.borrow().cob == msg.id;
            if cob_matches && msg.dlc != 0 {
                tpdo.borrow_mut().receive(msg.data);
                handler(&tpdo.borrow());
                return true;
            }
        }
        false
    }

    fn handle_sdo(&mut self, msg: Message, now: u32) -> bool {
        let service = msg.id & !0x7f;
        let id = (msg.id & 0x7f) as u8;
        if id == 0 {
            return false;
        }
        if service == 0x580 {
            if let Some(Some(handler)) = self.sdo_devices.get_mut(id as usize) {
                handler(Sdo::from_message(msg), now);
            }
            return true;
        }
        false
    }
}

/// A CANopen node. Queues outgoing SDO writes/reads with a 2ms minimum
/// gap between them (`spec.md`'s Supplement F), so a burst of
/// configuration writes (as [`Device::enable_rpdo`]/
/// [`Device::enable_tpdo`] issue) doesn't flood the bus faster than the
/// device can answer.
pub struct Device {
    pub id: u8,
    out: Rc<RefCell<Dispatch>>,
    queue: Queue<Sdo>,
    next: Deadline,
    on_sdo: Box<dyn FnMut(Sdo)>,
}

impl Device {
    /// Construct a `Device` for `id` on `dispatch`, registering it
    /// immediately so SDO responses start routing to `on_sdo`.
    ///
    /// # Panics
    /// Panics if `id` is outside `1..128`.
    pub fn new(dispatch: Rc<RefCell<Dispatch>>, id: u8, on_sdo: impl FnMut(Sdo) + 'static) -> Rc<RefCell<Device>> {
        assert!(id > 0 && id < 128, "CANopen node id must be in 1..128");
        let dev = Rc::new(RefCell::new(Device {
            id,
            out: dispatch.clone(),
            queue: Queue::with_capacity(60),
            next: Deadline::none(),
            on_sdo: Box::new(on_sdo),
        }));
        let target = dev.clone();
        dispatch.borrow_mut().register_sdo(
            id,
            Box::new(move |sdo, now| {
                target.borrow_mut().receive_sdo(sdo, now);
            }),
        );
        dev
    }

    /// Queue a read of DO `ix`/`sub`.
    pub fn read(&mut self, ix: u16, sub: u8, now: u32) {
        self.push_or_queue(Sdo { data: 0, ix, sub, cmd: 0x40, node_id: self.id }, now);
    }

    pub fn w8(&mut self, ix: u16, sub: u8, val: u8, now: u32) {
        self.push_or_queue(Sdo { data: val as u32, ix, sub, cmd: 0x2f, node_id: self.id }, now);
    }

    pub fn w16(&mut self, ix: u16, sub: u8, val: u16, now: u32) {
        self.push_or_queue(Sdo { data: val as u32, ix, sub, cmd: 0x2b, node_id: self.id }, now);
    }

    pub fn w32(&mut self, ix: u16, sub: u8, val: u32, now: u32) {
        self.push_or_queue(Sdo { data: val, ix, sub, cmd: 0x23, node_id: self.id }, now);
    }

    /// Send an RPDO immediately (RPDOs are fire-and-forget, unlike SDO
    /// traffic — no per-device queueing).
    pub fn send_rpdo(&mut self, rpdo: &Rpdo) {
        self.out.borrow_mut().push_message(rpdo.to_message());
    }

    /// Configure the device (over SDO) to accept `rpdo` and start
    /// listening for it.
    pub fn enable_rpdo(&mut self, rpdo: &mut Rpdo, now: u32) {
        if rpdo.cob == 0 {
            rpdo.cob = self.id as u32 + 0x100 * (rpdo.n as u32 + 1);
        }
        self.disable_rpdo(rpdo, now);
        let n = rpdo.n as u16 - 1;
        self.w8(0x1400 + n, 0x2, rpdo.kind.wire(), now);
        self.w8(0x1600 + n, 0x0, 0, now);
        for (i, entry) in rpdo.map.iter().enumerate() {
            let word = (entry.ix as u32) << 16 | (entry.sub as u32) << 8 | entry.len as u32;
            self.w32(0x1600 + n, (i + 1) as u8, word, now);
        }
        self.w8(0x1600 + n, 0x0, rpdo.map.len() as u8, now);
        self.w32(0x1400 + n, 0x1, (1 << 30) | rpdo.cob, now);
    }

    pub fn disable_rpdo(&mut self, rpdo: &Rpdo, now: u32) {
        let n = rpdo.n as u16 - 1;
        self.w32(0x1400 + n, 0x1, 1 << 31, now);
    }

    /// Configure the device (over SDO) to transmit `tpdo`, and register
    /// `on_tpdo` to receive decoded values as they arrive.
    pub fn enable_tpdo(&mut self, tpdo: Rc<RefCell<Tpdo>>, on_tpdo: impl FnMut(&Tpdo) + 'static, now: u32) {
        {
            let mut t = tpdo.borrow_mut();
            if t.cob == 0 {
                t.cob = self.id as u32 + 0x80 + 0x100 * t.n as u32;
            }
        }
        self.disable_tpdo(&tpdo, now);
        let (n, kind, inhibit_time, map) = {
            let t = tpdo.borrow();
            (t.n as u16 - 1, t.kind, t.inhibit_time, t.map.clone())
        };
        self.w8(0x1800 + n, 0x2, kind.wire(), now);
        self.w16(0x1800 + n, 0x3, inhibit_time as u16, now);
        self.w8(0x1a00 + n, 0x0, 0, now);
        for (i, entry) in map.iter().enumerate() {
            let word = (entry.ix as u32) << 16 | (entry.sub as u32) << 8 | entry.len as u32;
            self.w32(0x1a00 + n, (i + 1) as u8, word, now);
        }
        self.w8(0x1a00 + n, 0x0, map.len() as u8, now);
        let cob = tpdo.borrow().cob;
        self.w32(0x1800 + n, 0x1, (1 << 30) | cob, now);
        self.out.borrow_mut().register_pdo(tpdo, Box::new(on_tpdo));
    }

    pub fn disable_tpdo(&mut self, tpdo: &Rc<RefCell<Tpdo>>, now: u32) {
        let n = tpdo.borrow().n as u16 - 1;
        self.w32(0x1800 + n, 0x1, 1 << 31, now);
    }

    fn receive_sdo(&mut self, sdo: Sdo, now: u32) {
        self.next = Deadline::none();
        (self.on_sdo)(sdo);
        self.drain_queue(now);
    }

    /// Push the oldest queued SDO once the 2ms inter-request gap has
    /// elapsed.
    fn drain_queue(&mut self, now: u32) {
        if self.queue.empty() {
            return;
        }
        if self.next.is_armed() && !self.next.poll(now) {
            return;
        }
        let sdo = self.queue.pop();
        self.out.borrow_mut().push_sdo(sdo);
        self.next = Deadline::at(now + 2);
    }

    fn push_or_queue(&mut self, sdo: Sdo, now: u32) {
        if self.next.is_armed() && !self.next.poll(now) {
            assert!(!self.queue.full(), "Device: SDO request queue full");
            self.queue.push(sdo);
        } else {
            self.out.borrow_mut().push_sdo(sdo);
            self.next = Deadline::at(now + 2);
        }
    }
}
