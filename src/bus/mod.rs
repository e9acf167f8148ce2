//! Per-peripheral instantiations of [`crate::request::Engine`].
//!
//! Grounded on `original_source/stm/i2c.h` (the queue-based generation;
//! per `spec.md` §9's Open Questions, the older blocking
//! `RequestQueue<T>` style in `stm/spi.h`/`stm/uart.h` is deliberately
//! *not* ported). Each submodule defines the bus-specific `Request`
//! shape and leaves the actual register-level transfer (the
//! `Transport` impl) to the embedding application, since vendor HAL
//! glue is an explicit Non-goal — these modules own the policy
//! (ordering, single-flight, timeout, SPI mode-switch caching), not
//! the silicon.

pub mod can;
pub mod i2c;
pub mod spi;
pub mod uart;
