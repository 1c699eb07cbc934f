use embedded_hal::digital::OutputPin;

use crate::clock::Clock;
use crate::constants::FATAL_BLINK_INTERVAL;

/// On/off status light. Purely observational, failures to drive the pin are
/// ignored.
pub trait Indicator {
    fn on(&mut self);
    fn off(&mut self);
}

impl<P: OutputPin> Indicator for P {
    fn on(&mut self) {
        let _ = self.set_high();
    }

    fn off(&mut self) {
        let _ = self.set_low();
    }
}

/// The three status lights of the node.
pub struct Indicators<L> {
    /// Lit around every publish, blinks on fatal errors
    pub transmit: L,
    /// Lit while scanning for barcodes
    pub scanning: L,
    /// Lit while classifying
    pub classifying: L,
}

impl<L: Indicator> Indicators<L> {
    pub fn all_off(&mut self) {
        self.transmit.off();
        self.scanning.off();
        self.classifying.off();
    }
}

/// Blink `led` rapidly forever. The device needs an external restart.
pub async fn fatal_signal<L: Indicator, C: Clock>(led: &mut L, clock: &mut C) -> ! {
    log::error!("Fatal error, restart required");
    loop {
        led.on();
        clock.sleep(FATAL_BLINK_INTERVAL).await;
        led.off();
        clock.sleep(FATAL_BLINK_INTERVAL).await;
    }
}
