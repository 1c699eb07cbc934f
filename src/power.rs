#![allow(async_fn_in_trait)]

use embassy_time::{Duration, Instant};
use embedded_hal_async::digital::Wait;

use crate::clock::Clock;
use crate::pipeline::Camera;

/// Device states driven by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Sleeping,
    Scanning,
    Classifying,
    Transmitting,
    FatalError,
}

/// External wake source, e.g. a motion sensor on an interrupt pin.
pub trait WakeSignal {
    /// Suspend until the wake event fires.
    async fn wait_for_wake(&mut self);
}

/// Motion sensor with an open-drain output pulled up: motion is a falling
/// edge. Debouncing is left to the sensor.
pub struct MotionSensor<P> {
    pin: P,
}

impl<P: Wait> MotionSensor<P> {
    pub fn new(pin: P) -> Self {
        Self { pin }
    }
}

impl<P> WakeSignal for MotionSensor<P>
where
    P: Wait,
    P::Error: core::fmt::Debug,
{
    async fn wait_for_wake(&mut self) {
        if let Err(e) = self.pin.wait_for_falling_edge().await {
            log::warn!("Wake pin error, waking anyway: {:?}", e);
        }
    }
}

/// Time since the last barcode, or since scanning started.
#[derive(Debug, Clone, Copy)]
pub struct IdleTimer {
    started: Instant,
    timeout: Duration,
}

impl IdleTimer {
    pub fn new(now: Instant, timeout: Duration) -> Self {
        Self {
            started: now,
            timeout,
        }
    }

    pub fn reset(&mut self, now: Instant) {
        self.started = now;
    }

    pub fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) > self.timeout
    }
}

/// Sleeping/active power management.
pub struct PowerController<W> {
    wake: W,
    idle: IdleTimer,
}

impl<W: WakeSignal> PowerController<W> {
    pub fn new(wake: W, now: Instant, idle_timeout: Duration) -> Self {
        Self {
            wake,
            idle: IdleTimer::new(now, idle_timeout),
        }
    }

    /// Restart the idle timer, after a detection or when scanning starts.
    pub fn touch(&mut self, now: Instant) {
        self.idle.reset(now);
    }

    pub fn idle_expired(&self, now: Instant) -> bool {
        self.idle.expired(now)
    }

    /// Power the camera down and suspend until the wake signal fires. Returns
    /// with the camera still off; the caller selects the scanning mode.
    pub async fn sleep<Cam: Camera, C: Clock>(&mut self, camera: &mut Cam, clock: &C) {
        log::info!("Entering sleep");
        if let Err(e) = camera.shutdown().await {
            log::warn!("Camera shutdown failed: {:?}", e);
        }

        self.wake.wait_for_wake().await;

        log::info!("Woken up");
        self.idle.reset(clock.now());
    }
}
