//! Plain data types that make up the system's topology and calibration
//! tables. Nothing here does I/O; loading lives in [`super::config`] and
//! [`super::text_files`].

/// Number of ADC channels carried in one [`crate::event::RawEvent`], and the
/// order [`AdcLocationEntry::slots`] follows: a, b, c, d, com0, com1, com0h,
/// com1h, u0, v0, u1, v1, u0h, v0h, u1h, v1h.
pub const ADC_CHANNEL_COUNT: usize = 16;

/// Sentinel slot index for a channel that is not read out in a given
/// trigger code. The decoder's scratch buffer has one extra, always-zero
/// cell at this index so reading it yields `DEFAULT_NO_READ_ADC_VALUE` (0)
/// without a branch.
pub const NO_ADC_VALUE: usize = 96;

/// Topology sizes enumerated once at load and used to size every flat table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologySizes {
    pub panels: usize,
    pub cartridges_per_panel: usize,
    pub daqs_per_cartridge: usize,
    pub chips_per_daq: usize,
    pub modules_per_chip: usize,
    pub fins_per_cartridge: usize,
    pub modules_per_fin: usize,
    pub apds_per_module: usize,
    pub crystals_per_apd: usize,
}

impl TopologySizes {
    pub fn trigger_codes(&self) -> usize {
        16
    }
}

/// Per-channel readout enable flags programmed into one analog chip channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenaChannelConfig {
    pub slow_hit_readout: bool,
    pub fast_hit_readout: bool,
}

/// Resolved channel settings for one module, after walking the
/// system/panel/cartridge/fin/module inheritance chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleChannelConfig {
    pub hit_threshold: i32,
    pub double_trigger_threshold: i32,
    pub com_l: RenaChannelConfig,
    pub com_h: RenaChannelConfig,
    pub spat_a: RenaChannelConfig,
    pub spat_b: RenaChannelConfig,
    pub spat_c: RenaChannelConfig,
    pub spat_d: RenaChannelConfig,
}

/// Baseline (pedestal) values for one module's twelve analog channels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModulePedestals {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub com0: f32,
    pub com1: f32,
    pub com0h: f32,
    pub com1h: f32,
    pub u0h: f32,
    pub v0h: f32,
    pub u1h: f32,
    pub v1h: f32,
}

/// Calibration for one crystal within one (panel, cartridge, fin, module, apd).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrystalCalibration {
    pub used: bool,
    pub gain_spat: f32,
    pub gain_comm: f32,
    pub eres_spat: f32,
    pub eres_comm: f32,
    pub x_loc: f32,
    pub y_loc: f32,
    pub time_offset: f32,
    /// Energy-dependent time correction. Optional in calibration files;
    /// defaults to 0.0 when absent.
    pub time_offset_edep: f32,
}

impl Default for CrystalCalibration {
    fn default() -> Self {
        CrystalCalibration {
            used: false,
            gain_spat: 1.0,
            gain_comm: 1.0,
            eres_spat: 0.0,
            eres_comm: 0.0,
            x_loc: 0.0,
            y_loc: 0.0,
            time_offset: 0.0,
            time_offset_edep: 0.0,
        }
    }
}

/// Where, within a decoded packet's ADC slot array, each of a module's
/// sixteen channels lives, for one (panel, cartridge, daq, chip, trigger
/// code, module). `slots[i] == NO_ADC_VALUE` means that channel is not read
/// out under this trigger code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcLocationEntry {
    pub triggered: bool,
    pub slots: [usize; ADC_CHANNEL_COUNT],
}

impl Default for AdcLocationEntry {
    fn default() -> Self {
        AdcLocationEntry {
            triggered: false,
            slots: [NO_ADC_VALUE; ADC_CHANNEL_COUNT],
        }
    }
}
