//! ESP32 wiring of the node: modem on UART2, three status LEDs and the
//! motion sensor.

use esp_alloc as _;
use esp_hal::{
    gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull},
    timer::timg::TimerGroup,
    uart::{self, Uart},
    Async,
};
use esp_println::logger::init_logger;

use crate::constants::{HEAP_SIZE, MODEM_BAUD_RATE, VERSION};
use crate::indicator::Indicators;
use crate::power::MotionSensor;

pub struct Board {
    pub modem: Uart<'static, Async>,
    pub leds: Indicators<Output<'static>>,
    pub motion: MotionSensor<Input<'static>>,
}

impl Board {
    /// Set up logging, the heap and the embassy time driver, then claim the
    /// peripherals the node uses.
    pub fn init() -> Result<Self, uart::ConfigError> {
        init_logger(log::LevelFilter::Info);
        log::info!("Parcel sensor node v{}", VERSION);

        let peripherals = esp_hal::init(esp_hal::Config::default());

        esp_alloc::heap_allocator!(size: HEAP_SIZE);

        let timg0 = TimerGroup::new(peripherals.TIMG0);
        esp_hal_embassy::init(timg0.timer0);

        let uart_config = uart::Config::default()
            .with_baudrate(MODEM_BAUD_RATE)
            .with_stop_bits(uart::StopBits::_1)
            .with_data_bits(uart::DataBits::_8)
            .with_parity(uart::Parity::None);

        let modem = Uart::new(peripherals.UART2, uart_config)?
            .with_tx(peripherals.GPIO17)
            .with_rx(peripherals.GPIO16)
            .into_async();

        let leds = Indicators {
            transmit: Output::new(peripherals.GPIO25, Level::Low, OutputConfig::default()),
            scanning: Output::new(peripherals.GPIO26, Level::Low, OutputConfig::default()),
            classifying: Output::new(peripherals.GPIO27, Level::Low, OutputConfig::default()),
        };

        // open-drain motion output, idle high
        let motion = Input::new(
            peripherals.GPIO33,
            InputConfig::default().with_pull(Pull::Up),
        );

        Ok(Self {
            modem,
            leds,
            motion: MotionSensor::new(motion),
        })
    }
}
