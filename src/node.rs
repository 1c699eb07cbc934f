use core::fmt::Debug;

use embedded_io_async::{Read, ReadReady, Write};

use crate::channel::Modem;
use crate::clock::Clock;
use crate::config::{self, Config, FailurePolicy};
use crate::indicator::{fatal_signal, Indicator, Indicators};
use crate::pipeline::{self, Barcode, Camera, CameraMode, Detection, Detector};
use crate::power::{DeviceState, PowerController, WakeSignal};
use crate::session::{self, MqttSettings, Session, TlsFiles};
use crate::transfer;

#[derive(Debug)]
pub enum Error {
    Config(config::Error),
    Session(session::Error),
    Transfer(transfer::Error),
    Camera,
}

impl From<session::Error> for Error {
    fn from(e: session::Error) -> Self {
        Error::Session(e)
    }
}

impl From<transfer::Error> for Error {
    fn from(e: transfer::Error) -> Self {
        Error::Transfer(e)
    }
}

fn camera_error<E: Debug>(e: E) -> Error {
    log::error!("Camera error: {:?}", e);
    Error::Camera
}

/// The sensor node: owns every collaborator and runs the detection loop.
pub struct Node<'c, S, C, Cam, D, W, L>
where
    Cam: Camera,
{
    config: &'c Config,
    session: Session<S, C>,
    clock: C,
    camera: Cam,
    detector: D,
    power: PowerController<W>,
    indicators: Indicators<L>,
    state: DeviceState,
    barcode: Option<Barcode>,
    detection: Option<Detection<Cam::Frame>>,
}

impl<'c, S, C, Cam, D, W, L> Node<'c, S, C, Cam, D, W, L>
where
    S: Read + Write + ReadReady,
    S::Error: Debug,
    C: Clock + Clone,
    Cam: Camera,
    D: Detector<Cam::Frame>,
    W: WakeSignal,
    L: Indicator,
{
    pub fn new(
        config: &'c Config,
        serial: S,
        clock: C,
        camera: Cam,
        detector: D,
        wake: W,
        indicators: Indicators<L>,
    ) -> Result<Self, Error> {
        config.validate().map_err(Error::Config)?;

        let modem = Modem::new(serial, clock.clone());
        let session = Session::new(modem, config.command_timeout());
        let power = PowerController::new(wake, clock.now(), config.idle_timeout());

        Ok(Self {
            config,
            session,
            clock,
            camera,
            detector,
            power,
            indicators,
            state: DeviceState::Sleeping,
            barcode: None,
            detection: None,
        })
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn session(&self) -> &Session<S, C> {
        &self.session
    }

    /// Bring the modem up to a configured MQTT session, then sleep until the
    /// first wake-up.
    pub async fn bring_up(&mut self) -> Result<(), Error> {
        self.session.reset();

        let result = self.setup_session().await;
        match result {
            Ok(()) => {
                log::info!("Modem ready, waiting for motion");
                self.state = DeviceState::Sleeping;
                Ok(())
            }
            Err(e) => {
                log::error!("Bring-up failed: {:?}", e);
                self.state = DeviceState::FatalError;
                Err(e)
            }
        }
    }

    async fn setup_session(&mut self) -> Result<(), Error> {
        let config = self.config;

        self.indicators.transmit.on();
        let probe = self.session.probe(config.modem_probe_attempts).await;
        self.indicators.transmit.off();
        probe?;

        self.session.initialize(config.diagnostics).await?;
        let network = self.session.network_info().await?;

        let apn = config.apn.unwrap_or(network.apn.as_str());
        self.session.activate_pdp(apn).await?;

        let files = TlsFiles {
            root_ca: config.tls_root_ca,
            client_cert: config.tls_client_cert,
            client_key: config.tls_client_key,
            root_only: config.tls_root_only,
        };
        self.session.configure_tls(&files, &network.ip).await?;

        let settings = MqttSettings {
            client_id: config.mqtt_client_id,
            host: config.mqtt_hostname,
            port: config.mqtt_port,
            keepalive_seconds: config.mqtt_keepalive_seconds,
            username: config.mqtt_username,
            password: config.mqtt_password,
            topic: Some(config.mqtt_topic),
        };
        self.session.configure_mqtt(&settings).await?;
        Ok(())
    }

    /// Run one state of the control loop and move to the next.
    pub async fn step(&mut self) -> Result<DeviceState, Error> {
        let result = match self.state {
            DeviceState::Sleeping => self.sleep().await,
            DeviceState::Scanning => self.scan().await,
            DeviceState::Classifying => self.classify().await,
            DeviceState::Transmitting => self.transmit().await,
            DeviceState::FatalError => Ok(DeviceState::FatalError),
        };

        match result {
            Ok(next) => {
                if next != self.state {
                    log::info!("{:?} -> {:?}", self.state, next);
                }
                self.state = next;
                Ok(next)
            }
            Err(e) => {
                log::error!("{:?} failed: {:?}", self.state, e);
                self.state = DeviceState::FatalError;
                Err(e)
            }
        }
    }

    /// Bring up, then loop forever. Ends in the fatal blink loop on any
    /// unrecoverable error.
    pub async fn run(mut self) -> ! {
        let _ = self.bring_up().await;

        while self.state != DeviceState::FatalError {
            let _ = self.step().await;
        }

        self.indicators.all_off();
        fatal_signal(&mut self.indicators.transmit, &mut self.clock).await
    }

    async fn sleep(&mut self) -> Result<DeviceState, Error> {
        self.indicators.all_off();
        self.power.sleep(&mut self.camera, &self.clock).await;

        self.camera
            .set_mode(CameraMode::Barcode)
            .await
            .map_err(camera_error)?;
        self.power.touch(self.clock.now());
        Ok(DeviceState::Scanning)
    }

    async fn scan(&mut self) -> Result<DeviceState, Error> {
        self.indicators.scanning.on();
        let barcodes = pipeline::scan(&mut self.camera, &mut self.detector)
            .await
            .map_err(camera_error)?;

        if let Some(barcode) = barcodes.into_iter().next() {
            self.indicators.scanning.off();
            log::info!(
                "Barcode {} payload {:?}",
                barcode.symbology.as_str(),
                barcode.payload.as_str()
            );
            self.barcode = Some(barcode);
            self.power.touch(self.clock.now());

            // Let the parcel be presented in full
            self.clock.sleep(self.config.cooldown()).await;

            self.camera
                .set_mode(CameraMode::Classification)
                .await
                .map_err(camera_error)?;
            return Ok(DeviceState::Classifying);
        }

        if self.power.idle_expired(self.clock.now()) {
            self.indicators.scanning.off();
            log::info!("No barcode for {} s", self.config.idle_timeout_seconds);
            return Ok(DeviceState::Sleeping);
        }

        Ok(DeviceState::Scanning)
    }

    async fn classify(&mut self) -> Result<DeviceState, Error> {
        let detection = pipeline::classify(
            &mut self.camera,
            &mut self.detector,
            &mut self.clock,
            &mut self.indicators.classifying,
            self.config.confidence_threshold,
            self.config.classification_timeout(),
        )
        .await
        .map_err(camera_error)?;

        match detection {
            Some(detection) => {
                self.detection = Some(detection);
                Ok(DeviceState::Transmitting)
            }
            None => {
                // Aborted attempts leave the idle timer alone
                self.barcode = None;
                self.camera
                    .set_mode(CameraMode::Barcode)
                    .await
                    .map_err(camera_error)?;
                Ok(DeviceState::Scanning)
            }
        }
    }

    async fn transmit(&mut self) -> Result<DeviceState, Error> {
        let (Some(barcode), Some(detection)) = (self.barcode.take(), self.detection.take()) else {
            log::warn!("Nothing to transmit");
            return Ok(DeviceState::Scanning);
        };

        let image = self
            .camera
            .compress(&detection.frame, self.config.jpeg_quality)
            .map_err(camera_error)?;
        let metadata = [
            barcode.symbology.as_str(),
            barcode.payload.as_str(),
            detection.label.as_str(),
        ];

        let outcome = self.send_image(&image, &metadata).await;

        self.power.touch(self.clock.now());
        self.camera
            .set_mode(CameraMode::Barcode)
            .await
            .map_err(camera_error)?;

        match outcome {
            Ok(()) => Ok(DeviceState::Scanning),
            Err(e) => match self.config.publish_failure_policy {
                FailurePolicy::Halt => Err(e),
                FailurePolicy::Continue => {
                    log::error!("Transfer failed, resuming scan: {:?}", e);
                    Ok(DeviceState::Scanning)
                }
            },
        }
    }

    async fn send_image(&mut self, image: &[u8], metadata: &[&str]) -> Result<(), Error> {
        self.session.connect().await?;

        let sent = transfer::send(
            &mut self.session,
            &mut self.indicators.transmit,
            self.config.mqtt_topic,
            image,
            metadata,
            self.config.chunk_size.into(),
        )
        .await;

        if let Err(e) = self.session.disconnect().await {
            log::warn!("MQTT disconnect failed: {:?}", e);
        }
        sent?;
        Ok(())
    }
}
