//! MLX90640 session on top of the `mlx9064x` driver.
//!
//! The driver owns calibration loading, sub-page reads and the temperature
//! pipeline. Control bits it does not expose (device mode, sub-page repeat)
//! and the raw EEPROM image are handled over the bus before the bus is
//! handed to the driver, which happens on the first driver-backed call.

use crate::frame::{self, Eeprom, PixelHealth, Readout, EEPROM_WORDS, PIXELS};
use crate::sensor::{DeviceMode, Resolution, SensorError, ThermalSensor};
use embedded_hal::blocking::i2c::{Write, WriteRead};
use linux_embedded_hal::I2cdev;
use mlx9064x::{AccessPattern, FrameRate as DriverRate, Mlx90640Driver as Mlx90640Camera, Resolution as DriverResolution};
use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

/// Factory-default 7-bit bus address.
pub const DEFAULT_ADDRESS: u8 = 0x33;

const CONTROL_REGISTER: u16 = 0x800D;
const EEPROM_START: u16 = 0x2400;

const CONTROL_SUBPAGE_REPEAT: u16 = 0x0008;
const CONTROL_DEVICE_MODE: u16 = 0x0002;
const CONTROL_REFRESH_RATE: u16 = 0x0380;

/// Pause between data-ready polls.
const POLL_INTERVAL: Duration = Duration::from_micros(500);

/// A sensor on a Linux `/dev/i2c-N` bus.
pub type LinuxMlx90640 = Mlx90640<I2cdev>;

enum Link<I2C> {
    /// Raw register access; the driver is not attached yet.
    Bus(I2C),
    Driver(Box<Mlx90640Camera<I2C>>),
    /// Attaching the driver failed and the bus went with it.
    Lost,
}

/// MLX90640 thermal sensor handle.
pub struct Mlx90640<I2C> {
    link: Link<I2C>,
    address: u8,
    eeprom: Eeprom,
}

impl Mlx90640<I2cdev> {
    /// Open a sensor on a Linux I2C bus (e.g., "/dev/i2c-1").
    pub fn open(bus_path: &str, address: u8) -> Result<Self, SensorError> {
        if !Path::new(bus_path).exists() {
            return Err(SensorError::BusNotFound(bus_path.to_string()));
        }

        let bus = I2cdev::new(bus_path).map_err(|e| SensorError::Open {
            path: bus_path.to_string(),
            reason: e.to_string(),
        })?;

        tracing::info!(bus = bus_path, address, "opened i2c bus");
        Ok(Self::new(bus, address))
    }

    /// List I2C bus device nodes present on this system.
    pub fn list_buses() -> Vec<String> {
        (0..16)
            .map(|i| format!("/dev/i2c-{i}"))
            .filter(|path| Path::new(path).exists())
            .collect()
    }
}

impl<I2C> Mlx90640<I2C>
where
    I2C: Write + WriteRead,
    <I2C as Write>::Error: Debug,
    <I2C as WriteRead>::Error: Debug,
    mlx9064x::Error<I2C>: Debug,
{
    pub fn new(bus: I2C, address: u8) -> Self {
        Self {
            link: Link::Bus(bus),
            address,
            eeprom: Eeprom::new(),
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Current value of control register 1. Only available before the
    /// driver is attached.
    pub fn control_register(&mut self) -> Result<u16, SensorError> {
        self.read_word(CONTROL_REGISTER)
    }

    /// Refresh-rate code currently programmed into the device.
    pub fn refresh_rate_code(&mut self) -> Result<u8, SensorError> {
        Ok(((self.control_register()? & CONTROL_REFRESH_RATE) >> 7) as u8)
    }

    fn bus(&mut self) -> Result<&mut I2C, SensorError> {
        match &mut self.link {
            Link::Bus(bus) => Ok(bus),
            _ => Err(SensorError::BusHandedOver),
        }
    }

    fn read_words(&mut self, register: u16, words: &mut [u16]) -> Result<(), SensorError> {
        let address = self.address;
        let mut bytes = vec![0u8; words.len() * 2];
        self.bus()?
            .write_read(address, &register.to_be_bytes(), &mut bytes)
            .map_err(|e| SensorError::Bus(format!("{e:?}")))?;

        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(2)) {
            *word = u16::from_be_bytes([chunk[0], chunk[1]]);
        }
        Ok(())
    }

    fn read_word(&mut self, register: u16) -> Result<u16, SensorError> {
        let mut word = [0u16; 1];
        self.read_words(register, &mut word)?;
        Ok(word[0])
    }

    fn write_word(&mut self, register: u16, word: u16) -> Result<(), SensorError> {
        let address = self.address;
        let [r0, r1] = register.to_be_bytes();
        let [w0, w1] = word.to_be_bytes();
        self.bus()?
            .write(address, &[r0, r1, w0, w1])
            .map_err(|e| SensorError::Bus(format!("{e:?}")))
    }

    /// Read-modify-write of the bits under `mask` in control register 1,
    /// verified by reading the register back.
    fn update_control(&mut self, mask: u16, bits: u16) -> Result<(), SensorError> {
        let current = self.read_word(CONTROL_REGISTER)?;
        let value = (current & !mask) | (bits & mask);
        self.write_word(CONTROL_REGISTER, value)?;

        let actual = self.read_word(CONTROL_REGISTER)?;
        if actual != value {
            return Err(SensorError::WriteVerify {
                register: CONTROL_REGISTER,
                written: value,
                actual,
            });
        }
        tracing::trace!(value, "control register updated");
        Ok(())
    }

    /// The driver, attaching it first if the bus is still ours. The EEPROM
    /// image is kept from just before the handover.
    fn driver(&mut self) -> Result<&mut Mlx90640Camera<I2C>, SensorError> {
        if matches!(self.link, Link::Bus(_)) {
            let mut words = [0u16; EEPROM_WORDS];
            self.read_words(EEPROM_START, &mut words)?;
            self.eeprom.words = words;

            self.link = match std::mem::replace(&mut self.link, Link::Lost) {
                Link::Bus(bus) => {
                    let camera = Mlx90640Camera::new(bus, self.address).map_err(driver_error)?;
                    tracing::debug!(address = self.address, "calibration loaded by driver");
                    Link::Driver(Box::new(camera))
                }
                other => other,
            };
        }

        match &mut self.link {
            Link::Driver(camera) => Ok(camera),
            _ => Err(SensorError::BusHandedOver),
        }
    }
}

fn driver_error<E: Debug>(e: E) -> SensorError {
    SensorError::Driver(format!("{e:?}"))
}

/// Driver frame rate for a 3-bit refresh-rate code.
fn driver_rate(code: u8) -> DriverRate {
    match code & 0x07 {
        0 => DriverRate::Half,
        1 => DriverRate::One,
        2 => DriverRate::Two,
        3 => DriverRate::Four,
        4 => DriverRate::Eight,
        5 => DriverRate::Sixteen,
        6 => DriverRate::ThirtyTwo,
        _ => DriverRate::SixtyFour,
    }
}

fn driver_resolution(resolution: Resolution) -> DriverResolution {
    match resolution {
        Resolution::Bits16 => DriverResolution::Sixteen,
        Resolution::Bits17 => DriverResolution::Seventeen,
        Resolution::Bits18 => DriverResolution::Eighteen,
        Resolution::Bits19 => DriverResolution::Nineteen,
    }
}

impl<I2C> ThermalSensor for Mlx90640<I2C>
where
    I2C: Write + WriteRead,
    <I2C as Write>::Error: Debug,
    <I2C as WriteRead>::Error: Debug,
    mlx9064x::Error<I2C>: Debug,
{
    type Params = PixelHealth;
    type Frame = Readout;

    fn set_device_mode(&mut self, mode: DeviceMode) -> Result<(), SensorError> {
        let bits = match mode {
            DeviceMode::Continuous => 0,
            DeviceMode::Step => CONTROL_DEVICE_MODE,
        };
        self.update_control(CONTROL_DEVICE_MODE, bits)
    }

    fn set_subpage_repeat(&mut self, repeat: bool) -> Result<(), SensorError> {
        let bits = if repeat { CONTROL_SUBPAGE_REPEAT } else { 0 };
        self.update_control(CONTROL_SUBPAGE_REPEAT, bits)
    }

    fn set_refresh_rate(&mut self, code: u8) -> Result<(), SensorError> {
        self.driver()?
            .set_frame_rate(driver_rate(code))
            .map_err(driver_error)
    }

    fn set_chess_mode(&mut self) -> Result<(), SensorError> {
        self.driver()?
            .set_access_pattern(AccessPattern::Chess)
            .map_err(driver_error)
    }

    fn dump_eeprom(&mut self, eeprom: &mut Eeprom) -> Result<(), SensorError> {
        self.driver()?;
        eeprom.words = self.eeprom.words;
        Ok(())
    }

    fn set_resolution(&mut self, resolution: Resolution) -> Result<(), SensorError> {
        self.driver()?
            .set_resolution(driver_resolution(resolution))
            .map_err(driver_error)
    }

    fn extract_parameters(&self, eeprom: &Eeprom) -> Result<PixelHealth, SensorError> {
        PixelHealth::from_eeprom(eeprom)
    }

    fn fetch_frame(&mut self, frame: &mut Readout) -> Result<(), SensorError> {
        let camera = self.driver()?;
        // No timeout: a device that never reports data blocks here.
        while !camera
            .generate_image_if_ready(&mut frame.temperatures)
            .map_err(driver_error)?
        {
            std::thread::sleep(POLL_INTERVAL);
        }
        frame.ambient = camera.ambient_temperature().ok_or(SensorError::NoAmbient)?;
        Ok(())
    }

    fn interpolate_outliers(&self, frame: &mut Readout, eeprom: &Eeprom) {
        frame::interpolate_outliers(&mut frame.temperatures, eeprom);
    }

    fn ambient_temperature(&self, frame: &Readout, _params: &PixelHealth) -> f32 {
        frame.ambient
    }

    fn calculate_to(
        &self,
        frame: &Readout,
        _params: &PixelHealth,
        emissivity: f32,
        reflected: f32,
        out: &mut [f32; PIXELS],
    ) {
        for (to, &unit) in out.iter_mut().zip(frame.temperatures.iter()) {
            *to = frame::compensate_emissivity(unit, emissivity, reflected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::EEPROM_PIXEL_BASE;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    const STATUS_REGISTER: u16 = 0x8000;
    const STATUS_DATA_READY: u16 = 0x0008;
    const RAM_START: u16 = 0x0400;

    #[derive(Debug)]
    struct Nack;

    /// Register-file model of the sensor, shared with the test so it stays
    /// visible after the bus moves into the driver.
    #[derive(Default)]
    struct Registers {
        words: HashMap<u16, u16>,
        writes: Vec<(u16, u16)>,
        /// Status reads that report "not ready" before data lands.
        ready_after: u32,
        fail_reads: bool,
        ignore_writes: bool,
    }

    #[derive(Clone)]
    struct MockBus(Rc<RefCell<Registers>>);

    impl MockBus {
        fn new() -> Self {
            let mut regs = Registers::default();
            regs.words.insert(CONTROL_REGISTER, 0x1901);
            regs.words.insert(STATUS_REGISTER, STATUS_DATA_READY | 1);
            for (i, word) in example_eeprom().words.iter().enumerate() {
                regs.words.insert(EEPROM_START + i as u16, *word);
            }
            for (offset, word) in example_ram() {
                regs.words.insert(RAM_START + offset, word);
            }
            Self(Rc::new(RefCell::new(regs)))
        }

        fn word(&self, register: u16) -> u16 {
            self.0.borrow().words.get(&register).copied().unwrap_or(0)
        }
    }

    impl Write for MockBus {
        type Error = Nack;

        fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Nack> {
            assert_eq!(address, DEFAULT_ADDRESS);
            let mut regs = self.0.borrow_mut();
            if bytes.len() != 4 || regs.ignore_writes {
                return Ok(());
            }
            let register = u16::from_be_bytes([bytes[0], bytes[1]]);
            let word = u16::from_be_bytes([bytes[2], bytes[3]]);
            regs.writes.push((register, word));
            if register == STATUS_REGISTER {
                let status = regs.words.get(&register).copied().unwrap_or(0);
                regs.words.insert(register, status & !STATUS_DATA_READY);
            } else {
                regs.words.insert(register, word);
            }
            Ok(())
        }
    }

    impl WriteRead for MockBus {
        type Error = Nack;

        fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Nack> {
            assert_eq!(address, DEFAULT_ADDRESS);
            let mut regs = self.0.borrow_mut();
            if regs.fail_reads {
                return Err(Nack);
            }
            let start = u16::from_be_bytes([bytes[0], bytes[1]]);
            if start == STATUS_REGISTER && regs.ready_after > 0 {
                regs.ready_after -= 1;
                buffer.fill(0);
                return Ok(());
            }
            for (i, chunk) in buffer.chunks_exact_mut(2).enumerate() {
                let word = regs.words.get(&start.wrapping_add(i as u16)).copied().unwrap_or(0);
                chunk.copy_from_slice(&word.to_be_bytes());
            }
            Ok(())
        }
    }

    /// EEPROM words from the datasheet's worked example for the supply and
    /// PTAT constants, with neutral values elsewhere.
    fn example_eeprom() -> Eeprom {
        let mut ee = Eeprom::new();
        ee.words[16] = 0x4210;
        ee.words[17] = 100;
        ee.words[33] = 0x2000;
        ee.words[48] = 0x1000;
        ee.words[49] = 0x2FF1;
        ee.words[50] = 0x5952;
        ee.words[51] = 0x9D68;
        ee.words[56] = 0x2363;
        for p in 0..PIXELS {
            ee.words[EEPROM_PIXEL_BASE + p] = 0x0010;
        }
        ee
    }

    /// RAM words (offset from RAM start) from the same worked example.
    fn example_ram() -> [(u16, u16); 4] {
        [(768, 0x4BF2), (800, 0x06AF), (810, 0xCCC5), (778, 0x1000)]
    }

    fn sensor() -> (Mlx90640<MockBus>, MockBus) {
        let bus = MockBus::new();
        (Mlx90640::new(bus.clone(), DEFAULT_ADDRESS), bus)
    }

    #[test]
    fn test_device_mode_and_repeat_bits() {
        let (mut s, bus) = sensor();
        s.set_device_mode(DeviceMode::Step).unwrap();
        s.set_subpage_repeat(true).unwrap();
        assert_eq!(bus.word(CONTROL_REGISTER), 0x1901 | 0x0002 | 0x0008);

        s.set_device_mode(DeviceMode::Continuous).unwrap();
        s.set_subpage_repeat(false).unwrap();
        assert_eq!(s.control_register().unwrap(), 0x1901);
        assert_eq!(s.refresh_rate_code().unwrap(), 0b010);
    }

    #[test]
    fn test_session_setup_register_value() {
        let (mut s, bus) = sensor();
        s.set_device_mode(DeviceMode::Continuous).unwrap();
        s.set_subpage_repeat(false).unwrap();
        s.set_chess_mode().unwrap();
        s.set_refresh_rate(0b101).unwrap();
        s.set_resolution(Resolution::Bits19).unwrap();

        assert_eq!(bus.word(CONTROL_REGISTER), 0x1E81);
    }

    #[test]
    fn test_dump_eeprom_reads_image_before_handover() {
        let (mut s, _bus) = sensor();
        let mut ee = Eeprom::new();
        s.dump_eeprom(&mut ee).unwrap();
        assert_eq!(ee, example_eeprom());
        assert_eq!(s.extract_parameters(&ee).unwrap(), PixelHealth::default());
    }

    #[test]
    fn test_register_access_closed_after_handover() {
        let (mut s, _bus) = sensor();
        s.set_chess_mode().unwrap();
        assert_eq!(
            s.set_device_mode(DeviceMode::Continuous),
            Err(SensorError::BusHandedOver)
        );
        assert_eq!(s.control_register(), Err(SensorError::BusHandedOver));
    }

    #[test]
    fn test_fetch_frame_worked_example() {
        let (mut s, _bus) = sensor();
        let mut frame = Readout::default();
        s.fetch_frame(&mut frame).unwrap();

        let ta = s.ambient_temperature(&frame, &PixelHealth::default());
        assert!((ta - 39.18).abs() < 0.5, "ta = {ta}");
        assert!(frame.temperatures.iter().any(|t| t.is_finite()));
    }

    #[test]
    fn test_fetch_frame_waits_for_data_ready() {
        let (mut s, bus) = sensor();
        bus.0.borrow_mut().ready_after = 3;
        let mut frame = Readout::default();
        s.fetch_frame(&mut frame).unwrap();

        let regs = bus.0.borrow();
        assert_eq!(regs.ready_after, 0);
        assert_eq!(regs.words[&STATUS_REGISTER] & STATUS_DATA_READY, 0);
    }

    #[test]
    fn test_calculate_to_applies_emissivity() {
        let (s, _bus) = sensor();
        let frame = Readout {
            temperatures: [30.0; PIXELS],
            ambient: 20.0,
        };
        let health = PixelHealth::default();
        let mut out = [0.0f32; PIXELS];

        s.calculate_to(&frame, &health, 1.0, 20.0, &mut out);
        assert!(out.iter().all(|&t| t == 30.0));

        s.calculate_to(&frame, &health, 0.8, 20.0, &mut out);
        assert!(out.iter().all(|&t| t > 32.0 && t < 33.0));
    }

    #[test]
    fn test_refresh_codes_map_to_driver_rates() {
        assert!(matches!(driver_rate(0), DriverRate::Half));
        assert!(matches!(driver_rate(3), DriverRate::Four));
        assert!(matches!(driver_rate(5), DriverRate::Sixteen));
        assert!(matches!(driver_rate(0xFF), DriverRate::SixtyFour));
    }

    #[test]
    fn test_bus_error_propagates() {
        let (mut s, bus) = sensor();
        bus.0.borrow_mut().fail_reads = true;
        assert_eq!(
            s.set_device_mode(DeviceMode::Step),
            Err(SensorError::Bus("Nack".into()))
        );
    }

    #[test]
    fn test_write_verify_failure() {
        let (mut s, bus) = sensor();
        bus.0.borrow_mut().ignore_writes = true;
        // repeat bit is already clear, so the read-back still matches
        s.set_subpage_repeat(false).unwrap();
        assert_eq!(
            s.set_device_mode(DeviceMode::Step),
            Err(SensorError::WriteVerify {
                register: CONTROL_REGISTER,
                written: 0x1903,
                actual: 0x1901,
            })
        );
    }
}
