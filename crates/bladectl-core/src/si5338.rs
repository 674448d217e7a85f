//! Si5338 sample-rate synthesis
//!
//! The sample clocks come from two Si5338 multisynths fed by a fixed
//! 2534.4 MHz VCO (38.4 MHz x 66). Multisynth 1 clocks RX, multisynth 2
//! clocks TX. Each divides the VCO by an exact rational `a + b/c`; rates
//! below 5 MHz additionally go through a power-of-two R divider.

use crate::error::{Error, Result};
use crate::transport::{Module, Transport};

/// Si5338 reference input
pub const REFERENCE_HZ: u64 = 38_400_000;
/// Fixed VCO frequency
pub const VCO_HZ: u64 = REFERENCE_HZ * 66;

/// Lowest supported sample rate
pub const MIN_SAMPLE_RATE: u32 = 160_000;
/// Highest supported sample rate
pub const MAX_SAMPLE_RATE: u32 = 40_000_000;

const MIN_MULTISYNTH_HZ: u64 = 5_000_000;
const MAX_R_POWER: u8 = 5;

const MS_BASE: u8 = 53;
const MS_STRIDE: u8 = 11;
const MS_REG_COUNT: usize = 10;
const OUTPUT_ENABLE_BASE: u8 = 36;
const R_DIVIDER_BASE: u8 = 31;
const R_DIVIDER_FIXED: u8 = 0xc0;

/// Multisynth feeding a module's sample clock
pub fn multisynth_index(module: Module) -> u8 {
    match module {
        Module::Rx => 1,
        Module::Tx => 2,
    }
}

/// Output enable bits (A, B) for a module's multisynth
fn output_enables(module: Module) -> u8 {
    match module {
        Module::Rx => 0x01,
        Module::Tx => 0x03,
    }
}

/// Register values for one multisynth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultisynthPlan {
    /// Multisynth number
    pub index: u8,
    /// Integer part of the divide ratio
    pub a: u64,
    /// Fraction numerator
    pub b: u64,
    /// Fraction denominator
    pub c: u64,
    /// Encoded parameter P1
    pub p1: u32,
    /// Encoded parameter P2
    pub p2: u32,
    /// Encoded parameter P3
    pub p3: u32,
    /// R divider is `2^r_power`
    pub r_power: u8,
    /// Sample rate this plan produces
    pub sample_rate: u32,
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl MultisynthPlan {
    /// Compute the multisynth settings for `sample_rate` on `module`.
    pub fn compute(module: Module, sample_rate: u32) -> Result<Self> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(Error::OutOfRange(sample_rate as u64));
        }

        let mut r_power = 0;
        let mut output_hz = sample_rate as u64;
        while output_hz < MIN_MULTISYNTH_HZ && r_power < MAX_R_POWER {
            output_hz <<= 1;
            r_power += 1;
        }

        let a = VCO_HZ / output_hz;
        let remainder = VCO_HZ % output_hz;
        let divisor = gcd(remainder, output_hz);
        let (b, c) = (remainder / divisor, output_hz / divisor);

        let p1 = (a * c + b) * 128 / c - 512;
        let p2 = (b * 128) % c;

        Ok(Self {
            index: multisynth_index(module),
            a,
            b,
            c,
            p1: p1 as u32,
            p2: p2 as u32,
            p3: c as u32,
            r_power,
            sample_rate,
        })
    }

    /// Rebuild a plan from the encoded parameters
    fn decode(index: u8, regs: &[u8; MS_REG_COUNT], r_power: u8) -> Result<Self> {
        let p1 = regs[0] as u32 | (regs[1] as u32) << 8 | ((regs[2] & 0x03) as u32) << 16;
        let p2 = ((regs[2] >> 2) as u32)
            | (regs[3] as u32) << 6
            | (regs[4] as u32) << 14
            | (regs[5] as u32) << 22;
        let p3 = u32::from_le_bytes([regs[6], regs[7], regs[8], regs[9]]) & 0x3fff_ffff;
        if p3 == 0 {
            return Err(Error::Protocol);
        }

        let c = p3 as u64;
        let numerator_x128 = (p1 as u64 + 512) * c + p2 as u64;
        let output_hz = (VCO_HZ as u128 * c as u128 * 128 / numerator_x128 as u128) as u64;
        let a = numerator_x128 / 128 / c;
        let b = numerator_x128 / 128 - a * c;

        Ok(Self {
            index,
            a,
            b,
            c,
            p1,
            p2,
            p3,
            r_power,
            sample_rate: (output_hz >> r_power) as u32,
        })
    }

    /// Multisynth parameter registers, starting at `53 + 11 * index`
    pub fn registers(&self) -> [u8; MS_REG_COUNT] {
        let [p3_0, p3_1, p3_2, p3_3] = self.p3.to_le_bytes();
        [
            self.p1 as u8,
            (self.p1 >> 8) as u8,
            (((self.p2 & 0x3f) << 2) as u8) | ((self.p1 >> 16) & 0x03) as u8,
            (self.p2 >> 6) as u8,
            (self.p2 >> 14) as u8,
            (self.p2 >> 22) as u8,
            p3_0,
            p3_1,
            p3_2,
            p3_3,
        ]
    }

    fn base_register(&self) -> u8 {
        MS_BASE + MS_STRIDE * self.index
    }
}

/// Program a module's sample clock.
pub fn set_sample_rate<T: Transport + ?Sized>(
    dev: &mut T,
    module: Module,
    sample_rate: u32,
) -> Result<MultisynthPlan> {
    let plan = MultisynthPlan::compute(module, sample_rate)?;
    log::debug!(
        "{} MS{}: {} + {}/{} (P1={} P2={} P3={}) R=2^{}",
        module,
        plan.index,
        plan.a,
        plan.b,
        plan.c,
        plan.p1,
        plan.p2,
        plan.p3,
        plan.r_power
    );

    dev.si5338_write(OUTPUT_ENABLE_BASE + plan.index, output_enables(module))?;
    let base = plan.base_register();
    for (offset, value) in plan.registers().into_iter().enumerate() {
        dev.si5338_write(base + offset as u8, value)?;
    }
    dev.si5338_write(
        R_DIVIDER_BASE + plan.index,
        R_DIVIDER_FIXED | (plan.r_power << 2),
    )?;
    Ok(plan)
}

/// Read a module's multisynth back and reconstruct its sample rate.
pub fn get_sample_rate<T: Transport + ?Sized>(dev: &mut T, module: Module) -> Result<u32> {
    let index = multisynth_index(module);
    let base = MS_BASE + MS_STRIDE * index;

    let mut regs = [0u8; MS_REG_COUNT];
    for (offset, reg) in regs.iter_mut().enumerate() {
        *reg = dev.si5338_read(base + offset as u8)?;
    }
    let r_power = (dev.si5338_read(R_DIVIDER_BASE + index)? >> 2) & 0x07;

    Ok(MultisynthPlan::decode(index, &regs, r_power)?.sample_rate)
}
