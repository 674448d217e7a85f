//! LMS6002D PLL frequency synthesis
//!
//! The transceiver's RX and TX PLLs each take a band selector, a 9-bit
//! integer divider and a 23-bit fractional divider. [`compute_plan`] derives
//! these from a target frequency with integer arithmetic only; the fraction
//! comes from a restoring long division so the result is bit exact and
//! identical on every host. [`calibrate_vco`] then sweeps the VCO capacitor
//! trim to find the middle of the lock window.

use crate::error::{Error, Result};
use crate::transport::{Module, Transport};

/// Reference clock feeding the LMS PLLs
pub const REFERENCE_HZ: u32 = 38_400_000;

/// DSM clock-enable register, shared by both PLLs
pub const REG_CLK_EN: u8 = 0x09;
const DSM_ENABLE: u8 = 0x05;

const VCOCAP_MASK: u8 = 0x3f;
const VTUNE_HIGH: u8 = 0x80;
const VTUNE_LOW: u8 = 0x40;
/// Written with every swept trim value
const VCOCAP_SWEEP: u8 = 0x80;
const PLL_ENABLE: u8 = 1 << 3;

/// Frequencies at or above this use the high-band output buffer
const HIGH_BAND_HZ: u64 = 1_500_000_000;

/// One row of the VCO/divider band table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    /// Exclusive lower bound in Hz
    pub low_hz: u64,
    /// Inclusive upper bound in Hz
    pub high_hz: u64,
    /// FREQSEL value: VCO in bits 5..3, divider in bits 2..0
    pub selector: u8,
}

const fn band(low_hz: u64, high_hz: u64, selector: u8) -> Band {
    Band {
        low_hz,
        high_hz,
        selector,
    }
}

/// Tunable range of the LMS6002D, ascending and contiguous
pub const BANDS: [Band; 16] = [
    band(232_500_000, 285_625_000, 0x27),
    band(285_625_000, 336_875_000, 0x2f),
    band(336_875_000, 405_000_000, 0x37),
    band(405_000_000, 465_000_000, 0x3f),
    band(465_000_000, 571_250_000, 0x26),
    band(571_250_000, 673_750_000, 0x2e),
    band(673_750_000, 810_000_000, 0x36),
    band(810_000_000, 930_000_000, 0x3e),
    band(930_000_000, 1_142_500_000, 0x25),
    band(1_142_500_000, 1_347_500_000, 0x2d),
    band(1_347_500_000, 1_620_000_000, 0x35),
    band(1_620_000_000, 1_860_000_000, 0x3d),
    band(1_860_000_000, 2_285_000_000, 0x24),
    band(2_285_000_000, 2_695_000_000, 0x2c),
    band(2_695_000_000, 3_240_000_000, 0x34),
    band(3_240_000_000, 3_720_000_000, 0x3c),
];

/// Lowest tunable frequency
pub const MIN_FREQUENCY_HZ: u64 = BANDS[0].low_hz;
/// Highest tunable frequency
pub const MAX_FREQUENCY_HZ: u64 = BANDS[BANDS.len() - 1].high_hz;

/// Find the band containing `hz`.
///
/// A band covers `low_hz < hz <= high_hz`; the lowest band also includes
/// its lower bound, which is the bottom of the tunable range.
pub fn select_band(hz: u64) -> Result<&'static Band> {
    if hz == MIN_FREQUENCY_HZ {
        return Ok(&BANDS[0]);
    }
    BANDS
        .iter()
        .find(|b| b.low_hz < hz && hz <= b.high_hz)
        .ok_or(Error::OutOfRange(hz))
}

/// Register values for one PLL setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PllPlan {
    /// Frequency the plan was computed for
    pub target_hz: u64,
    /// VCO to LO divider (2, 4, 8 or 16)
    pub x: u8,
    /// Integer part of the divider
    pub n_integer: u16,
    /// Fractional part of the divider, over 2^23
    pub n_fraction: u32,
    /// FREQSEL band selector
    pub band_selector: u8,
    /// Reference clock the plan is relative to
    pub reference_hz: u32,
}

impl PllPlan {
    /// NINT/NFRAC register bytes, in register order (base + 0..=3)
    pub fn divider_registers(&self) -> [u8; 4] {
        [
            (self.n_integer >> 1) as u8,
            (((self.n_integer & 1) as u8) << 7) | ((self.n_fraction >> 16) & 0x7f) as u8,
            (self.n_fraction >> 8) as u8,
            self.n_fraction as u8,
        ]
    }

    /// FREQSEL register byte (base + 5); only the RX PLL carries SELOUT
    pub fn selector_register(&self, module: Module) -> u8 {
        match module {
            Module::Rx => {
                let selout = if self.target_hz < HIGH_BAND_HZ { 1 } else { 2 };
                (self.band_selector << 2) | selout
            }
            Module::Tx => self.band_selector << 2,
        }
    }

    /// Frequency the plan actually produces, rounded to whole Hz
    pub fn frequency(&self) -> u64 {
        reconstruct(
            self.n_integer,
            self.n_fraction,
            self.x,
            self.reference_hz,
        )
    }
}

fn divider_for(selector: u8) -> Option<u8> {
    match selector & 7 {
        bits @ 4..=7 => Some(1 << (bits - 3)),
        _ => None,
    }
}

fn reconstruct(n_integer: u16, n_fraction: u32, x: u8, reference_hz: u32) -> u64 {
    let n = ((n_integer as u64) << 23) + n_fraction as u64;
    let div = (x as u64) << 23;
    (n * reference_hz as u64 + div / 2) / div
}

/// Compute the PLL divider settings for `target_hz`.
pub fn compute_plan(target_hz: u64, reference_hz: u32) -> Result<PllPlan> {
    let band = select_band(target_hz)?;
    if reference_hz == 0 {
        return Err(Error::OutOfRange(0));
    }
    let x = divider_for(band.selector).ok_or(Error::Protocol)?;
    let reference = reference_hz as u64;

    let vco_hz = target_hz * x as u64;
    let n_integer = vco_hz / reference;
    let mut left = vco_hz - n_integer * reference;

    // Restoring long division; the first quotient bit is always zero
    let mut n_fraction: u32 = 0;
    for _ in 0..24 {
        if left >= reference {
            left -= reference;
            n_fraction = (n_fraction << 1) | 1;
        } else {
            n_fraction <<= 1;
        }
        left <<= 1;
    }

    Ok(PllPlan {
        target_hz,
        x,
        n_integer: n_integer as u16,
        n_fraction,
        band_selector: band.selector,
        reference_hz,
    })
}

/// First register of a module's PLL block
pub fn pll_base(module: Module) -> u8 {
    match module {
        Module::Rx => 0x20,
        Module::Tx => 0x10,
    }
}

/// Program a plan into a module's PLL registers.
pub fn apply_plan<T: Transport + ?Sized>(dev: &mut T, module: Module, plan: &PllPlan) -> Result<()> {
    let base = pll_base(module);
    log::debug!(
        "{} PLL: x={} nint={} nfrac={} freqsel=0x{:02x}",
        module,
        plan.x,
        plan.n_integer,
        plan.n_fraction,
        plan.band_selector
    );

    dev.lms_write(base + 5, plan.selector_register(module))?;
    for (offset, value) in plan.divider_registers().into_iter().enumerate() {
        dev.lms_write(base + offset as u8, value)?;
    }

    // Charge pump currents: Ichp, then Iup, then Idn
    let ichp = dev.lms_read(base + 6)?;
    dev.lms_write(base + 6, (ichp & !0x1f) | 0x0c)?;
    dev.lms_write(base + 7, 0xe3)?;
    let idn = dev.lms_read(base + 8)?;
    dev.lms_write(base + 8, idn & !0x1f)?;
    Ok(())
}

/// Sweep the VCO capacitor trim and program the middle of the lock window.
///
/// The lock window is the run of trims reporting neither VTUNE high nor
/// low. It starts at the first such trim and ends before the next trim
/// reporting VTUNE low, or at the top of the sweep. A window needs at least
/// one edge: a sweep reporting neither bit anywhere is not trusted. Without
/// a window, a direct step from VTUNE high to low is used instead, bounded
/// by the last high and first low trim. The result is the floor of the
/// midpoint. When neither is found the trim register keeps its last swept
/// value and [`Error::Calibration`] is returned.
pub fn calibrate_vco<T: Transport + ?Sized>(dev: &mut T, module: Module) -> Result<u8> {
    let cap_reg = pll_base(module) + 9;
    let vtune_reg = pll_base(module) + 10;

    let upper = dev.lms_read(cap_reg)? & !VCOCAP_MASK;
    let mut start = None;
    let mut stop = None;
    let mut last_high = None;
    let mut first_low = None;

    for cap in 0..=VCOCAP_MASK {
        dev.lms_write(cap_reg, cap | VCOCAP_SWEEP)?;
        let vtune = dev.lms_read(vtune_reg)? & (VTUNE_HIGH | VTUNE_LOW);
        match vtune {
            VTUNE_HIGH => {
                if start.is_none() {
                    last_high = Some(cap);
                }
            }
            VTUNE_LOW => {
                if start.is_some() {
                    stop = stop.or(Some(cap - 1));
                } else if last_high.is_some() {
                    first_low = first_low.or(Some(cap));
                }
            }
            0 => start = start.or(Some(cap)),
            _ => log::warn!("{} VCO reports both VTUNE high and low at cap {}", module, cap),
        }
    }

    let window = match (start, stop) {
        (Some(start), Some(stop)) => Some((start, stop)),
        (Some(start), None) if last_high.is_some() => Some((start, VCOCAP_MASK)),
        (Some(_), None) => None,
        (None, _) => last_high.zip(first_low),
    };
    let Some((start, stop)) = window else {
        log::warn!(
            "{} VCO calibration failed (start={:?}, high={:?}, low={:?})",
            module,
            start,
            last_high,
            first_low
        );
        return Err(Error::Calibration);
    };

    let trim = (start + stop) / 2;
    log::debug!("{} VCOCAP: start={} stop={} trim={}", module, start, stop, trim);
    dev.lms_write(cap_reg, upper | trim)?;
    Ok(trim)
}

/// Tune a module's PLL to `hz`.
///
/// The delta-sigma modulators are enabled for the duration of the update
/// and disabled again afterwards, also when tuning fails.
pub fn set_frequency<T: Transport + ?Sized>(dev: &mut T, module: Module, hz: u64) -> Result<PllPlan> {
    let plan = compute_plan(hz, REFERENCE_HZ)?;
    log::info!("Tuning {} to {} Hz", module, hz);

    let clk_en = dev.lms_read(REG_CLK_EN)?;
    dev.lms_write(REG_CLK_EN, clk_en | DSM_ENABLE)?;

    let tuned = apply_plan(dev, module, &plan).and_then(|()| calibrate_vco(dev, module));
    let restored = dev
        .lms_read(REG_CLK_EN)
        .and_then(|clk_en| dev.lms_write(REG_CLK_EN, clk_en & !DSM_ENABLE));

    tuned?;
    restored?;
    Ok(plan)
}

/// Read a module's PLL registers back and reconstruct the tuned frequency.
pub fn get_frequency<T: Transport + ?Sized>(dev: &mut T, module: Module) -> Result<u64> {
    let base = pll_base(module);
    let mut regs = [0u8; 4];
    for (offset, reg) in regs.iter_mut().enumerate() {
        *reg = dev.lms_read(base + offset as u8)?;
    }
    let selector = dev.lms_read(base + 5)? >> 2;

    let n_integer = ((regs[0] as u16) << 1) | ((regs[1] & 0x80) >> 7) as u16;
    let n_fraction =
        (((regs[1] & 0x7f) as u32) << 16) | ((regs[2] as u32) << 8) | regs[3] as u32;
    let x = divider_for(selector).ok_or(Error::Protocol)?;

    Ok(reconstruct(n_integer, n_fraction, x, REFERENCE_HZ))
}

/// Enable or disable a module's PLL
pub fn pll_enable<T: Transport + ?Sized>(dev: &mut T, module: Module, enable: bool) -> Result<()> {
    let reg = pll_base(module) + 4;
    let value = dev.lms_read(reg)?;
    let value = if enable {
        value | PLL_ENABLE
    } else {
        value & !PLL_ENABLE
    };
    dev.lms_write(reg, value)
}
