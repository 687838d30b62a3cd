use std::convert::Infallible;
use std::io::Write;
use std::time::Duration;
use thermcam_core::cadence::Cadence;
use thermcam_core::{palette, stream, Clock, ColorImage, FrameRate, TemperatureGrid};
use thermcam_hw::{DeviceMode, Eeprom, Resolution, SensorError, ThermalSensor};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("sensor error: {0}")]
    Sensor(#[from] SensorError),
    #[error("output stream error: {0}")]
    Output(#[from] std::io::Error),
}

/// Frame layout written to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// 768 native-endian f32 temperatures per frame.
    Temps,
    /// 768 false-color RGB triples per frame, vertically flipped.
    Rgb,
}

/// Everything a session needs beyond the sensor itself.
pub struct SessionSettings {
    pub rate: FrameRate,
    pub emissivity: f32,
    pub format: OutputFormat,
}

/// Outcome of one acquisition cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleReport {
    pub ambient: f32,
    pub elapsed: Duration,
    /// Requested sleep; non-positive when the cycle overran.
    pub sleep_micros: i64,
}

/// A configured sensor plus the buffers reused by every cycle.
pub struct Session<S: ThermalSensor> {
    sensor: S,
    params: S::Params,
    eeprom: Eeprom,
    frame: S::Frame,
    grid: TemperatureGrid,
    image: ColorImage,
    cadence: Cadence,
    emissivity: f32,
    format: OutputFormat,
    cycles: u64,
}

impl<S: ThermalSensor> Session<S> {
    /// Program the sensor and extract its calibration.
    ///
    /// Steps run in order and the first failure aborts setup; the returned
    /// session is ready to run.
    pub fn configure(mut sensor: S, settings: &SessionSettings) -> Result<Self, EngineError> {
        sensor.set_device_mode(DeviceMode::Continuous)?;
        sensor.set_subpage_repeat(false)?;
        sensor.set_chess_mode()?;

        sensor.set_refresh_rate(settings.rate.code())?;
        tracing::info!(
            rate = %settings.rate,
            code = settings.rate.code(),
            "refresh rate set"
        );

        let mut eeprom = Eeprom::new();
        sensor.dump_eeprom(&mut eeprom)?;
        sensor.set_resolution(Resolution::Bits19)?;

        let params = sensor.extract_parameters(&eeprom)?;
        tracing::info!("calibration parameters extracted");

        let cadence = Cadence::new(settings.rate);
        tracing::debug!(
            frame_period_us = cadence.frame_period_micros(),
            target_us = cadence.target_micros(),
            "cadence"
        );

        Ok(Self {
            sensor,
            params,
            eeprom,
            frame: Default::default(),
            grid: TemperatureGrid::new(),
            image: ColorImage::new(),
            cadence,
            emissivity: settings.emissivity,
            format: settings.format,
            cycles: 0,
        })
    }

    /// Latest completed grid.
    pub fn grid(&self) -> &TemperatureGrid {
        &self.grid
    }

    /// Number of completed cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Acquire, calibrate and emit one frame, then sleep out the rest of the
    /// cycle budget.
    pub fn cycle<W: Write, C: Clock>(
        &mut self,
        sink: &mut W,
        clock: &C,
    ) -> Result<CycleReport, EngineError> {
        let start = clock.now();

        self.sensor.fetch_frame(&mut self.frame)?;
        self.sensor.interpolate_outliers(&mut self.frame, &self.eeprom);
        let ambient = self.sensor.ambient_temperature(&self.frame, &self.params);
        self.sensor.calculate_to(
            &self.frame,
            &self.params,
            self.emissivity,
            ambient,
            &mut self.grid.values,
        );

        match self.format {
            OutputFormat::Temps => stream::write_temperatures(sink, &self.grid)?,
            OutputFormat::Rgb => {
                palette::render(&self.grid, &mut self.image);
                stream::write_rgb(sink, &self.image)?;
            }
        }

        let elapsed = clock.now().saturating_sub(start);
        let sleep_micros = self.cadence.residual_micros(elapsed);
        self.cycles += 1;

        if sleep_micros <= 0 {
            tracing::debug!(
                cycle = self.cycles,
                elapsed_us = elapsed.as_micros() as u64,
                overrun_us = -sleep_micros,
                "cycle overran its budget"
            );
        } else {
            tracing::trace!(
                cycle = self.cycles,
                ambient,
                elapsed_us = elapsed.as_micros() as u64,
                sleep_us = sleep_micros,
                "frame emitted"
            );
        }
        clock.sleep_micros(sleep_micros);

        Ok(CycleReport {
            ambient,
            elapsed,
            sleep_micros,
        })
    }

    /// Cycle until a sensor or output error occurs.
    pub fn run<W: Write, C: Clock>(
        &mut self,
        sink: &mut W,
        clock: &C,
    ) -> Result<Infallible, EngineError> {
        let first = self.cycle(sink, clock)?;
        tracing::info!(
            ambient = first.ambient,
            elapsed_us = first.elapsed.as_micros() as u64,
            sleep_us = first.sleep_micros,
            "first frame emitted"
        );
        loop {
            self.cycle(sink, clock)?;
        }
    }
}
