//! Interrupt-safe device sharing.
//!
//! The sample clock usually lives in an interrupt handler while
//! attach, poll, and handler installation happen in thread mode.
//! [`Bus`] wraps a [`Device`] in a critical-section mutex so both
//! sides can reach it, mirroring how the rest of the firmware is
//! expected to share peripherals.

use core::cell::RefCell;
use cortex_m::interrupt::{self, Mutex};

use crate::descriptor::DescriptorStore;
use crate::device::{BusEvents, Device};
use crate::endpoint::EndpointHandler;
use crate::line::{PinDrive, PinState};

#[cfg(feature = "defmt-03")]
use crate::defmt;

pub struct Bus<'h, S> {
    device: Mutex<RefCell<Device<'h, S>>>,
}

impl<'h, S: DescriptorStore> Bus<'h, S> {
    /// Create a bus adapter from a `Device`.
    ///
    /// Install the endpoint handlers before wrapping the device, or
    /// through [`install_handler`](Bus::install_handler) afterwards.
    pub fn new(device: Device<'h, S>) -> Self {
        Bus {
            device: Mutex::new(RefCell::new(device)),
        }
    }

    /// Interrupt-safe, immutable access to the device.
    fn with_device<R>(&self, func: impl FnOnce(&Device<'h, S>) -> R) -> R {
        interrupt::free(|cs| {
            let device = self.device.borrow(cs);
            let device = device.borrow();
            func(&*device)
        })
    }

    /// Interrupt-safe, mutable access to the device.
    fn with_device_mut<R>(&self, func: impl FnOnce(&mut Device<'h, S>) -> R) -> R {
        interrupt::free(|cs| {
            let device = self.device.borrow(cs);
            let mut device = device.borrow_mut();
            func(&mut *device)
        })
    }

    pub fn attach(&self) {
        self.with_device_mut(|device| device.attach());
    }

    pub fn detach(&self) {
        self.with_device_mut(|device| device.detach());
    }

    pub fn install_handler(
        &self,
        endpoint: usize,
        handler: &'h mut dyn EndpointHandler,
        max_packet: u8,
    ) {
        self.with_device_mut(|device| device.install_handler(endpoint, handler, max_packet));
    }

    /// Advance the stack by one line sample. Call from the sample
    /// clock interrupt.
    pub fn tick(&self, pins: PinState) -> PinDrive {
        self.with_device_mut(|device| device.tick(pins))
    }

    /// Take the accumulated bus events. Call from thread mode.
    pub fn poll(&self) -> BusEvents {
        self.with_device_mut(|device| {
            let events = device.poll();
            if events.contains(BusEvents::RESET) {
                debug!("RESET");
            }
            if events.contains(BusEvents::ADDRESSED) {
                debug!("ADDRESS {}", device.address());
            }
            if events.contains(BusEvents::CONFIGURED) {
                debug!("CONFIGURED {}", device.configuration());
            }
            events
        })
    }

    pub fn address(&self) -> u8 {
        self.with_device(|device| device.address())
    }

    pub fn configuration(&self) -> u8 {
        self.with_device(|device| device.configuration())
    }

    pub fn frame_number(&self) -> u16 {
        self.with_device(|device| device.frame_number())
    }
}
