//! NS2009 Touch Panel Controller
//!
//! Platform agnostic driver for the NS2009 4-wire resistive touch panel
//! controller, using the [`embedded-hal`](https://docs.rs/embedded-hal)
//! traits. The controller is reached over I²C; a dedicated line reports the
//! press state.

#![no_std]

use core::fmt;
use core::mem;

use embedded_hal::{digital::InputPin, i2c::I2c};

// I²C address of the NS2009
const I2C_ADDR: u8 = 0x48;

// Conversion commands. The high nibble selects the channel to convert,
// bits 3:2 control power-down between conversions. Bit 2 nominally masks
// the press interrupt output but the controller revisions we have ignore
// it, so commands keep it clear.
const CMD_READ_X: u8 = 0xC0;
const CMD_READ_Y: u8 = 0xD0;

/// Error type for the NS2009 driver
#[derive(Debug)]
pub enum Error<E> {
    I2c(E),
    Pin,
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::I2c(e) => write!(f, "I2C error: {:?}", e),
            Error::Pin => write!(f, "Pin error"),
        }
    }
}

/// ADC precision of one conversion.
///
/// These are the only widths the converter produces; the width picks the
/// normalization divisor (`2^bits`) used by the calibration transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleResolution {
    /// 8-bit conversions, one byte per sample.
    #[default]
    Bits8,
    /// 12-bit conversions, two bytes per sample.
    Bits12,
}

impl SampleResolution {
    /// Maps an ADC bit width to a resolution, rejecting widths the
    /// controller cannot produce.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            8 => Some(Self::Bits8),
            12 => Some(Self::Bits12),
            _ => None,
        }
    }

    /// Number of bits in one conversion.
    pub const fn bits(self) -> u8 {
        match self {
            Self::Bits8 => 8,
            Self::Bits12 => 12,
        }
    }

    const fn full_scale(self) -> u32 {
        1 << self.bits()
    }
}

/// Mounting of the touch panel relative to the display.
///
/// The flags are independent: an inverted axis is measured from the far
/// edge, and `swap_axes` routes the panel's X channel to logical Y and vice
/// versa. Swapping also exchanges the per-axis calibration, so each axis's
/// offset, scale and resolution follow it onto the channel that now feeds
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Orientation {
    pub invert_x: bool,
    pub invert_y: bool,
    pub swap_axes: bool,
}

/// A calibrated touch location in display pixels.
///
/// Coordinates are not clamped: readings near the panel edges can land
/// outside `[0, resolution)`, negative values included.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TouchPoint {
    pub x: i32,
    pub y: i32,
}

/// Physical conversion channel of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    X,
    Y,
}

impl Channel {
    const fn command(self) -> u8 {
        match self {
            Self::X => CMD_READ_X,
            Self::Y => CMD_READ_Y,
        }
    }
}

/// Calibration parameters for one logical axis.
#[derive(Debug, Clone, Copy, PartialEq)]
struct AxisCalibration {
    /// Display resolution of the axis, in pixels
    display_res: u16,
    /// Effective panel span the scale is derived from
    panel_res: u16,
    /// Offset applied before scaling, in pre-scale pixels
    offset: i16,
    /// `display_res / panel_res`, fixed at configuration time
    scale: f32,
    /// Measure the axis from the far edge
    invert: bool,
}

impl AxisCalibration {
    fn new(display_res: u16, panel_res: u16, offset: i16) -> Self {
        assert!(display_res != 0 && panel_res != 0);

        Self {
            display_res,
            panel_res,
            offset,
            scale: f32::from(display_res) / f32::from(panel_res),
            invert: false,
        }
    }

    /// Converts a raw conversion result into a display-pixel coordinate.
    ///
    /// Both the normalization and the final float conversion truncate
    /// toward zero; the fixed-point reference readings were produced that
    /// way and rounding here would shift them by one pixel.
    fn transform(self, raw: u16, resolution: SampleResolution) -> i32 {
        let normalized =
            (u32::from(raw) * u32::from(self.display_res) / resolution.full_scale()) as i32;
        let base = if self.invert {
            i32::from(self.display_res) - normalized
        } else {
            normalized
        };
        ((base + i32::from(self.offset)) as f32 * self.scale) as i32
    }
}

/// NS2009 Options
pub struct Ns2009Options {
    /// Resolution (w, h) of the display the panel covers.
    pub display_resolution: (u16, u16),
    /// Effective panel span (x, y) the per-axis scales are derived from.
    pub panel_resolution: (u16, u16),
    /// Per-axis calibration offsets, applied before scaling.
    pub offsets: (i16, i16),
    /// ADC precision of each conversion.
    pub sample_resolution: SampleResolution,
    /// Mounting of the panel relative to the display.
    pub orientation: Orientation,
}

impl Default for Ns2009Options {
    /// Calibration for the 3.5" ILI9488 module this driver was tuned
    /// against. Override per panel.
    fn default() -> Self {
        Self {
            display_resolution: (320, 480),
            panel_resolution: (415, 285),
            offsets: (5, -20),
            sample_resolution: SampleResolution::Bits8,
            orientation: Orientation {
                invert_x: false,
                invert_y: true,
                swap_axes: true,
            },
        }
    }
}

/// NS2009 Builder
pub struct Ns2009Builder<I2C, IRQ> {
    /// Underlying I²C peripheral
    i2c: I2C,
    /// Press line, asserted low while the panel is touched
    irq: IRQ,
    /// Options
    options: Ns2009Options,
}

impl<I2C, IRQ> Ns2009Builder<I2C, IRQ>
where
    I2C: I2c,
    IRQ: InputPin,
{
    /// Creates a new Ns2009Builder instance.
    pub fn new(i2c: I2C, irq: IRQ) -> Self {
        Self {
            i2c,
            irq,
            options: Ns2009Options::default(),
        }
    }

    /// Sets the resolution of the display the panel covers
    pub fn display_resolution(mut self, width: u16, height: u16) -> Self {
        assert!(width != 0 && height != 0);

        self.options.display_resolution = (width, height);
        self
    }

    /// Sets the effective panel span the per-axis scales are derived from
    pub fn panel_resolution(mut self, width: u16, height: u16) -> Self {
        assert!(width != 0 && height != 0);

        self.options.panel_resolution = (width, height);
        self
    }

    /// Sets the per-axis calibration offsets
    pub fn offsets(mut self, x: i16, y: i16) -> Self {
        self.options.offsets = (x, y);
        self
    }

    /// Sets the ADC precision used for conversions
    pub fn sample_resolution(mut self, resolution: SampleResolution) -> Self {
        self.options.sample_resolution = resolution;
        self
    }

    /// Sets the mounting orientation of the panel
    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.options.orientation = orientation;
        self
    }

    /// Builds the NS2009 driver with the provided options.
    pub fn build(self) -> Result<Ns2009<I2C, IRQ>, Error<I2C::Error>> {
        Ns2009::new(self.i2c, self.irq, self.options)
    }
}

/// NS2009 driver
///
/// All operations are blocking and take `&mut self`; the configuration is
/// only ever changed through the same exclusive handle the reads go
/// through, so a reconfiguration cannot interleave with a read.
pub struct Ns2009<I2C, IRQ> {
    /// Underlying I²C peripheral
    i2c: I2C,
    /// Press line, asserted low while the panel is touched
    irq: IRQ,
    /// Calibration slot applied to physical channel X reads
    x: AxisCalibration,
    /// Calibration slot applied to physical channel Y reads
    y: AxisCalibration,
    /// Physical channel behind logical X
    x_source: Channel,
    /// Physical channel behind logical Y
    y_source: Channel,
    sample_resolution: SampleResolution,
    orientation: Orientation,
}

pub trait TouchPanel {
    type Error;

    fn touch_point(&mut self) -> Result<TouchPoint, Self::Error>;
    fn is_pressed(&mut self) -> Result<bool, Self::Error>;
}

impl<I2C, IRQ> TouchPanel for Ns2009<I2C, IRQ>
where
    I2C: I2c,
    IRQ: InputPin,
{
    type Error = Error<I2C::Error>;

    fn touch_point(&mut self) -> Result<TouchPoint, Self::Error> {
        Ns2009::touch_point(self)
    }

    fn is_pressed(&mut self) -> Result<bool, Self::Error> {
        Ns2009::is_pressed(self)
    }
}

impl<I2C, IRQ> Ns2009<I2C, IRQ>
where
    I2C: I2c,
    IRQ: InputPin,
{
    /// Create a new instance of the driver and initialize the device
    fn new(i2c: I2C, irq: IRQ, options: Ns2009Options) -> Result<Self, Error<I2C::Error>> {
        let (display_x, display_y) = options.display_resolution;
        let (panel_x, panel_y) = options.panel_resolution;
        let (offset_x, offset_y) = options.offsets;

        let mut ns2009 = Self {
            i2c,
            irq,
            x: AxisCalibration::new(display_x, panel_x, offset_x),
            y: AxisCalibration::new(display_y, panel_y, offset_y),
            x_source: Channel::X,
            y_source: Channel::Y,
            sample_resolution: options.sample_resolution,
            orientation: Orientation::default(),
        };
        ns2009.set_orientation(options.orientation);

        // Throwaway conversion settles the power-down state and arms the
        // press line before the first real read.
        let _ = ns2009.read_sample(Channel::X)?;

        Ok(ns2009)
    }

    /// Set the mounting orientation of the panel
    ///
    /// The invert flags are taken from `orientation` as given. An axis swap
    /// rebinds the conversion channels and exchanges the two calibration
    /// records; the exchange is symmetric, so requesting a swap again from
    /// a swapped configuration restores the original pairing.
    pub fn set_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;

        self.x.invert = orientation.invert_x;
        self.y.invert = orientation.invert_y;

        if orientation.swap_axes {
            self.x_source = Channel::Y;
            self.y_source = Channel::X;

            // One exchange moves invert flags, offsets, scales and
            // resolutions together; the pairs cannot go out of step.
            mem::swap(&mut self.x, &mut self.y);
        } else {
            self.x_source = Channel::X;
            self.y_source = Channel::Y;
        }
    }

    /// Get the last-applied mounting orientation
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Get the display resolution pair as currently permuted by the
    /// orientation, (x, y) in pixels
    pub fn resolution(&self) -> (u16, u16) {
        (self.x.display_res, self.y.display_res)
    }

    /// Read the calibrated X coordinate of the touch location
    pub fn read_x(&mut self) -> Result<i32, Error<I2C::Error>> {
        self.read_axis(self.x_source)
    }

    /// Read the calibrated Y coordinate of the touch location
    pub fn read_y(&mut self) -> Result<i32, Error<I2C::Error>> {
        self.read_axis(self.y_source)
    }

    /// Read both calibrated coordinates of the touch location
    pub fn touch_point(&mut self) -> Result<TouchPoint, Error<I2C::Error>> {
        let point = TouchPoint {
            x: self.read_x()?,
            y: self.read_y()?,
        };
        log::debug!("{:?}", point);
        Ok(point)
    }

    /// Check if the panel is currently pressed
    ///
    /// A plain level read of the press line, which is asserted low while
    /// the panel is touched. No debouncing.
    pub fn is_pressed(&mut self) -> Result<bool, Error<I2C::Error>> {
        self.irq.is_low().map_err(|_| Error::Pin)
    }

    /// Release the I²C bus and the press-line pin
    pub fn release(self) -> (I2C, IRQ) {
        (self.i2c, self.irq)
    }

    /// Read one physical axis: its conversion channel plus the calibration
    /// held in that channel's slot. After a swap the slots carry the
    /// exchanged parameters, so a logical axis bound to the opposite
    /// channel still comes out in its own display span.
    fn read_axis(&mut self, source: Channel) -> Result<i32, Error<I2C::Error>> {
        let raw = self.read_sample(source)?;
        let calibration = match source {
            Channel::X => self.x,
            Channel::Y => self.y,
        };
        let value = calibration.transform(raw, self.sample_resolution);
        log::debug!("{:?}: raw {} -> {}", source, raw, value);
        Ok(value)
    }

    /// Read one raw conversion result from a physical channel
    fn read_sample(&mut self, channel: Channel) -> Result<u16, Error<I2C::Error>> {
        let command = channel.command();
        match self.sample_resolution {
            SampleResolution::Bits8 => {
                let mut buf = [0u8; 1];
                self.read_register(command, &mut buf)?;
                Ok(u16::from(buf[0]))
            }
            SampleResolution::Bits12 => {
                // High byte first, low nibble in the top of the second byte
                let mut buf = [0u8; 2];
                self.read_register(command, &mut buf)?;
                Ok(u16::from(buf[0]) << 4 | u16::from(buf[1]) >> 4)
            }
        }
    }

    /// Issue a conversion command and read back the result
    fn read_register(&mut self, command: u8, buf: &mut [u8]) -> Result<(), Error<I2C::Error>> {
        self.i2c.write_read(I2C_ADDR, &[command], buf).map_err(|e| {
            log::error!("I2C read failed for command {:#04x}: {:?}", command, e);
            Error::I2c(e)
        })
    }
}
