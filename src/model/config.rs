//! Configuration tree schema and the system -> panel -> cartridge -> fin ->
//! module inheritance walk.
//!
//! The file syntax itself is out of scope; what matters is the schema this
//! deserializes, which mirrors the tree `SystemConfiguration::load` walked
//! by hand in the original implementation.

use serde::Deserialize;
use std::path::Path;

use super::types::{ModuleChannelConfig, RenaChannelConfig, TopologySizes};
use crate::error::ConfigError;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct RenaChannelSettings {
    pub slow_hit_readout: Option<bool>,
    pub fast_hit_readout: Option<bool>,
}

impl RenaChannelSettings {
    fn merge_onto(&self, base: RenaChannelConfig) -> RenaChannelConfig {
        RenaChannelConfig {
            slow_hit_readout: self.slow_hit_readout.unwrap_or(base.slow_hit_readout),
            fast_hit_readout: self.fast_hit_readout.unwrap_or(base.fast_hit_readout),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ChannelSettings {
    pub hit_threshold: Option<i32>,
    pub double_trigger_threshold: Option<i32>,
    pub com_l: Option<RenaChannelSettings>,
    pub com_h: Option<RenaChannelSettings>,
    pub spat_a: Option<RenaChannelSettings>,
    pub spat_b: Option<RenaChannelSettings>,
    pub spat_c: Option<RenaChannelSettings>,
    pub spat_d: Option<RenaChannelSettings>,
}

impl ChannelSettings {
    fn merge_onto(&self, base: ModuleChannelConfig) -> ModuleChannelConfig {
        ModuleChannelConfig {
            hit_threshold: self.hit_threshold.unwrap_or(base.hit_threshold),
            double_trigger_threshold: self
                .double_trigger_threshold
                .unwrap_or(base.double_trigger_threshold),
            com_l: self
                .com_l
                .as_ref()
                .map(|s| s.merge_onto(base.com_l))
                .unwrap_or(base.com_l),
            com_h: self
                .com_h
                .as_ref()
                .map(|s| s.merge_onto(base.com_h))
                .unwrap_or(base.com_h),
            spat_a: self
                .spat_a
                .as_ref()
                .map(|s| s.merge_onto(base.spat_a))
                .unwrap_or(base.spat_a),
            spat_b: self
                .spat_b
                .as_ref()
                .map(|s| s.merge_onto(base.spat_b))
                .unwrap_or(base.spat_b),
            spat_c: self
                .spat_c
                .as_ref()
                .map(|s| s.merge_onto(base.spat_c))
                .unwrap_or(base.spat_c),
            spat_d: self
                .spat_d
                .as_ref()
                .map(|s| s.merge_onto(base.spat_d))
                .unwrap_or(base.spat_d),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ModuleNode {
    #[serde(default)]
    pub channel_settings: Option<ChannelSettings>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct FinNode {
    #[serde(default)]
    pub exclude_thermistor: bool,
    #[serde(default)]
    pub channel_settings: Option<ChannelSettings>,
    #[serde(default)]
    pub modules: Vec<ModuleNode>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct CartridgeNode {
    pub daqboard_id: u32,
    #[serde(default)]
    pub coincidence_window_ns: f64,
    #[serde(default)]
    pub ethernet: bool,
    #[serde(default)]
    pub port_name: String,
    #[serde(default)]
    pub channel_settings: Option<ChannelSettings>,
    #[serde(default)]
    pub fins: Vec<FinNode>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PanelNode {
    #[serde(default)]
    pub channel_settings: Option<ChannelSettings>,
    #[serde(default)]
    pub cartridges: Vec<CartridgeNode>,
}

#[derive(Debug, Deserialize)]
pub struct Topology {
    pub panels: usize,
    pub cartridges_per_panel: usize,
    pub daqs_per_cartridge: usize,
    pub chips_per_daq: usize,
    pub modules_per_chip: usize,
    pub fins_per_cartridge: usize,
    pub modules_per_fin: usize,
    #[serde(default = "default_apds")]
    pub apds_per_module: usize,
    #[serde(default = "default_crystals")]
    pub crystals_per_apd: usize,
    /// Nanoseconds for one full revolution of the UV timing circle.
    #[serde(default = "default_uv_period_ns")]
    pub uv_period_ns: f32,
    /// Nanoseconds per coarse timestamp tick.
    #[serde(default = "default_ct_period_ns")]
    pub ct_period_ns: f32,
}

fn default_apds() -> usize {
    2
}

fn default_crystals() -> usize {
    64
}

fn default_uv_period_ns() -> f32 {
    100.0
}

fn default_ct_period_ns() -> f32 {
    10.0
}

impl Topology {
    pub fn sizes(&self) -> TopologySizes {
        TopologySizes {
            panels: self.panels,
            cartridges_per_panel: self.cartridges_per_panel,
            daqs_per_cartridge: self.daqs_per_cartridge,
            chips_per_daq: self.chips_per_daq,
            modules_per_chip: self.modules_per_chip,
            fins_per_cartridge: self.fins_per_cartridge,
            modules_per_fin: self.modules_per_fin,
            apds_per_module: self.apds_per_module,
            crystals_per_apd: self.crystals_per_apd,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfigTree {
    pub topology: Topology,
    #[serde(default)]
    pub channel_settings: Option<ChannelSettings>,
    #[serde(default)]
    pub panels: Vec<PanelNode>,
}

impl ConfigTree {
    pub fn load(path: &Path) -> Result<ConfigTree, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolves per-module channel settings and per-cartridge backend board
    /// ids by walking system -> panel -> cartridge -> fin -> module,
    /// cloning and overriding at each level. Returns a PCFM-indexed flat
    /// vector of [`ModuleChannelConfig`] and a PCD-indexed flat vector of
    /// `daqboard_id`.
    pub fn resolve(&self) -> (Vec<ModuleChannelConfig>, Vec<u32>) {
        let sizes = self.topology.sizes();
        let system_default = self
            .channel_settings
            .as_ref()
            .map(|s| s.merge_onto(ModuleChannelConfig::default()))
            .unwrap_or_default();

        let mut settings =
            vec![
                ModuleChannelConfig::default();
                sizes.panels * sizes.cartridges_per_panel * sizes.fins_per_cartridge * sizes.modules_per_fin
            ];
        let mut daqboard_ids = vec![0u32; sizes.panels * sizes.cartridges_per_panel];

        for (p, panel) in self.panels.iter().enumerate() {
            let panel_default = panel
                .channel_settings
                .as_ref()
                .map(|s| s.merge_onto(system_default))
                .unwrap_or(system_default);
            for (c, cartridge) in panel.cartridges.iter().enumerate() {
                daqboard_ids[p * sizes.cartridges_per_panel + c] = cartridge.daqboard_id;
                let cartridge_default = cartridge
                    .channel_settings
                    .as_ref()
                    .map(|s| s.merge_onto(panel_default))
                    .unwrap_or(panel_default);
                for (f, fin) in cartridge.fins.iter().enumerate() {
                    let fin_default = fin
                        .channel_settings
                        .as_ref()
                        .map(|s| s.merge_onto(cartridge_default))
                        .unwrap_or(cartridge_default);
                    for (m, module) in fin.modules.iter().enumerate() {
                        let resolved = module
                            .channel_settings
                            .as_ref()
                            .map(|s| s.merge_onto(fin_default))
                            .unwrap_or(fin_default);
                        let idx = ((p * sizes.cartridges_per_panel + c)
                            * sizes.fins_per_cartridge
                            + f)
                            * sizes.modules_per_fin
                            + m;
                        settings[idx] = resolved;
                    }
                }
            }
        }
        (settings, daqboard_ids)
    }
}
