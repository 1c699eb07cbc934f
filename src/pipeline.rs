#![allow(async_fn_in_trait)]

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Debug;

use embassy_time::Duration;

use crate::clock::Clock;
use crate::indicator::Indicator;

/// Sensor configurations used by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    /// Grayscale VGA windowed to 640x40, fast enough for barcode decoding
    Barcode,
    /// RGB565 QVGA windowed to 240x240, the model input
    Classification,
}

/// Camera sensor driver.
pub trait Camera {
    type Frame;
    type Error: Debug;

    /// Reconfigure the sensor, returning once it has settled.
    async fn set_mode(&mut self, mode: CameraMode) -> Result<(), Self::Error>;

    async fn capture(&mut self) -> Result<Self::Frame, Self::Error>;

    /// JPEG-compress a frame.
    fn compress(&mut self, frame: &Self::Frame, quality: u8) -> Result<Vec<u8>, Self::Error>;

    /// Put the sensor into its lowest power state before the node sleeps.
    async fn shutdown(&mut self) -> Result<(), Self::Error>;
}

/// Barcode decoding and model inference on captured frames.
pub trait Detector<F> {
    fn scan_barcodes(&mut self, frame: &F) -> Vec<Barcode>;

    /// Scores of every object found in the frame, best label per object.
    fn classify(&mut self, frame: &F) -> Vec<Classification>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbology {
    Ean2,
    Ean5,
    Ean8,
    Upce,
    Isbn10,
    Upca,
    Ean13,
    Isbn13,
    I25,
    Databar,
    DatabarExp,
    Codabar,
    Code39,
    Pdf417,
    Code93,
    Code128,
}

impl Symbology {
    /// Name used in the transfer metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Symbology::Ean2 => "EAN2",
            Symbology::Ean5 => "EAN5",
            Symbology::Ean8 => "EAN8",
            Symbology::Upce => "UPCE",
            Symbology::Isbn10 => "ISBN10",
            Symbology::Upca => "UPCA",
            Symbology::Ean13 => "EAN13",
            Symbology::Isbn13 => "ISBN13",
            Symbology::I25 => "I25",
            Symbology::Databar => "DATABAR",
            Symbology::DatabarExp => "DATABAR_EXP",
            Symbology::Codabar => "CODABAR",
            Symbology::Code39 => "CODE39",
            Symbology::Pdf417 => "PDF417",
            Symbology::Code93 => "CODE93",
            Symbology::Code128 => "CODE128",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Barcode {
    pub symbology: Symbology,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
}

/// A confidently classified frame.
pub struct Detection<F> {
    pub frame: F,
    pub label: String,
    pub confidence: f32,
}

/// Capture one frame and decode barcodes in it.
pub async fn scan<Cam, D>(camera: &mut Cam, detector: &mut D) -> Result<Vec<Barcode>, Cam::Error>
where
    Cam: Camera,
    D: Detector<Cam::Frame>,
{
    let frame = camera.capture().await?;
    Ok(detector.scan_barcodes(&frame))
}

/// Classify frames until one object scores above `threshold`, or give up
/// once `timeout` has elapsed. `None` is the classification timeout.
pub async fn classify<Cam, D, C, L>(
    camera: &mut Cam,
    detector: &mut D,
    clock: &mut C,
    indicator: &mut L,
    threshold: f32,
    timeout: Duration,
) -> Result<Option<Detection<Cam::Frame>>, Cam::Error>
where
    Cam: Camera,
    D: Detector<Cam::Frame>,
    C: Clock,
    L: Indicator,
{
    indicator.on();
    let start = clock.now();
    let result = loop {
        let frame = match camera.capture().await {
            Ok(frame) => frame,
            Err(e) => break Err(e),
        };

        let best = detector
            .classify(&frame)
            .into_iter()
            .find(|c| c.confidence > threshold);
        if let Some(Classification { label, confidence }) = best {
            log::info!("Classified {:?} with confidence {}", label.as_str(), confidence);
            break Ok(Some(Detection {
                frame,
                label,
                confidence,
            }));
        }

        if clock.elapsed_since(start) > timeout {
            log::info!("No confident classification within {} s", timeout.as_secs());
            break Ok(None);
        }
    };
    indicator.off();
    result
}
