//! Immutable detector topology and calibration, loaded once and shared
//! read-only across every pipeline thread.

pub mod config;
pub mod tables;
pub mod text_files;
pub mod types;

use std::path::Path;

pub use types::{
    AdcLocationEntry, CrystalCalibration, ModuleChannelConfig, ModulePedestals, RenaChannelConfig,
    TopologySizes, ADC_CHANNEL_COUNT, NO_ADC_VALUE,
};

use crate::error::ConfigError;

/// Precomputed topology, channel settings, and calibration for the whole
/// detector. Built once by [`SystemModel::load`]; every field is read-only
/// afterward.
pub struct SystemModel {
    sizes: TopologySizes,
    uv_period_ns: f32,
    ct_period_ns: f32,
    channel_settings: Vec<ModuleChannelConfig>,
    backend_address_table: Vec<Option<(usize, usize)>>,
    packet_size: Vec<u32>,
    adc_locations: Vec<AdcLocationEntry>,
    pedestals: Vec<ModulePedestals>,
    calibration: Vec<CrystalCalibration>,
}

impl SystemModel {
    /// Loads topology and channel settings from the JSON configuration
    /// tree at `path`, then computes every decode table. Calibration and
    /// pedestal text files are loaded separately with
    /// [`SystemModel::load_pedestals`] and friends, matching the original
    /// implementation's multi-call load sequence.
    pub fn load(path: &Path) -> Result<SystemModel, ConfigError> {
        let tree = config::ConfigTree::load(path)?;
        let sizes = tree.topology.sizes();
        let (channel_settings, daqboard_ids) = tree.resolve();

        for &id in &daqboard_ids {
            if id >= 32 {
                return Err(ConfigError::InvalidBackendAddress(id));
            }
        }

        let backend_address_table = tables::build_backend_address_table(&sizes, &daqboard_ids);
        let packet_size = tables::build_packet_size_table(&sizes, &channel_settings);
        let adc_locations = tables::build_adc_location_table(&sizes, &channel_settings);
        let pedestals = vec![ModulePedestals::default(); sizes.panels
            * sizes.cartridges_per_panel
            * sizes.daqs_per_cartridge
            * sizes.chips_per_daq
            * sizes.modules_per_chip];
        let calibration = vec![
            CrystalCalibration::default();
            sizes.panels
                * sizes.cartridges_per_panel
                * sizes.fins_per_cartridge
                * sizes.modules_per_fin
                * sizes.apds_per_module
                * sizes.crystals_per_apd
        ];

        let model = SystemModel {
            sizes,
            uv_period_ns: tree.topology.uv_period_ns,
            ct_period_ns: tree.topology.ct_period_ns,
            channel_settings,
            backend_address_table,
            packet_size,
            adc_locations,
            pedestals,
            calibration,
        };
        model.verify_topology()?;
        Ok(model)
    }

    fn verify_topology(&self) -> Result<(), ConfigError> {
        for p in 0..self.sizes.panels {
            for c in 0..self.sizes.cartridges_per_panel {
                for f in 0..self.sizes.fins_per_cartridge {
                    for m in 0..self.sizes.modules_per_fin {
                        let Some((d, r, mc)) = tables::pcfm_to_pcdrm(&self.sizes, p, c, f, m)
                        else {
                            return Err(ConfigError::InvalidTopology {
                                panel: p,
                                cartridge: c,
                                fin: f,
                                module: m,
                            });
                        };
                        match tables::pcdrm_to_pcfm(&self.sizes, p, c, d, r, mc) {
                            Some((f2, m2)) if f2 == f && m2 == m => {}
                            _ => {
                                return Err(ConfigError::InvalidTopology {
                                    panel: p,
                                    cartridge: c,
                                    fin: f,
                                    module: m,
                                })
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn load_pedestals(&mut self, path: &Path) -> Result<(), ConfigError> {
        self.pedestals = text_files::load_pedestals(&self.sizes, path)?;
        Ok(())
    }

    pub fn load_uv_centers(&mut self, path: &Path) -> Result<(), ConfigError> {
        let sizes = self.sizes;
        text_files::load_uv_centers(&sizes, path, &mut self.pedestals, |p, c, f, m| {
            tables::pcfm_to_pcdrm(&sizes, p, c, f, m)
        })
    }

    pub fn load_calibration(&mut self, path: &Path) -> Result<(), ConfigError> {
        self.calibration = text_files::load_calibration(&self.sizes, path)?;
        Ok(())
    }

    pub fn load_time_calibration(&mut self, path: &Path) -> Result<(), ConfigError> {
        text_files::load_time_calibration(&self.sizes, path, &mut self.calibration)
    }

    pub fn sizes(&self) -> &TopologySizes {
        &self.sizes
    }

    pub fn uv_period_ns(&self) -> f32 {
        self.uv_period_ns
    }

    pub fn ct_period_ns(&self) -> f32 {
        self.ct_period_ns
    }

    pub fn lookup_panel_cartridge(&self, backend_address: usize) -> Option<(usize, usize)> {
        self.backend_address_table.get(backend_address).copied().flatten()
    }

    pub fn pcdrm_to_pcfm(
        &self,
        panel: usize,
        cartridge: usize,
        daq: usize,
        chip: usize,
        module_on_chip: usize,
    ) -> Option<(usize, usize)> {
        tables::pcdrm_to_pcfm(&self.sizes, panel, cartridge, daq, chip, module_on_chip)
    }

    pub fn pcfm_to_pcdrm(
        &self,
        panel: usize,
        cartridge: usize,
        fin: usize,
        module: usize,
    ) -> Option<(usize, usize, usize)> {
        tables::pcfm_to_pcdrm(&self.sizes, panel, cartridge, fin, module)
    }

    pub fn packet_size(&self, p: usize, c: usize, d: usize, r: usize, t: usize) -> Option<u32> {
        if t >= self.sizes.trigger_codes() {
            return None;
        }
        let idx = self.packet_size_index(p, c, d, r, t)?;
        self.packet_size.get(idx).copied()
    }

    fn packet_size_index(&self, p: usize, c: usize, d: usize, r: usize, t: usize) -> Option<usize> {
        if p >= self.sizes.panels
            || c >= self.sizes.cartridges_per_panel
            || d >= self.sizes.daqs_per_cartridge
            || r >= self.sizes.chips_per_daq
        {
            return None;
        }
        Some(
            (((p * self.sizes.cartridges_per_panel + c) * self.sizes.daqs_per_cartridge + d)
                * self.sizes.chips_per_daq
                + r)
                * self.sizes.trigger_codes()
                + t,
        )
    }

    pub fn adc_locations(&self, p: usize, c: usize, d: usize, r: usize, t: usize) -> Option<&[AdcLocationEntry]> {
        if p >= self.sizes.panels
            || c >= self.sizes.cartridges_per_panel
            || d >= self.sizes.daqs_per_cartridge
            || r >= self.sizes.chips_per_daq
            || t >= self.sizes.trigger_codes()
        {
            return None;
        }
        let start = (((p * self.sizes.cartridges_per_panel + c) * self.sizes.daqs_per_cartridge + d)
            * self.sizes.chips_per_daq
            + r)
            * self.sizes.trigger_codes()
            * self.sizes.modules_per_chip
            + t * self.sizes.modules_per_chip;
        self.adc_locations.get(start..start + self.sizes.modules_per_chip)
    }

    pub fn pedestals(&self, p: usize, c: usize, d: usize, r: usize, m: usize) -> Option<&ModulePedestals> {
        self.pedestals.get(tables::idx_pcdrm(&self.sizes, p, c, d, r, m))
    }

    pub fn module_channel_settings(&self, p: usize, c: usize, f: usize, m: usize) -> Option<&ModuleChannelConfig> {
        self.channel_settings.get(tables::idx_pcfm(&self.sizes, p, c, f, m))
    }

    pub fn calibration(
        &self,
        p: usize,
        c: usize,
        f: usize,
        m: usize,
        apd: usize,
        crystal: usize,
    ) -> Option<&CrystalCalibration> {
        self.calibration
            .get(tables::idx_pcfmac(&self.sizes, p, c, f, m, apd, crystal))
    }

    /// All crystal calibrations for one (panel, cartridge, fin, module,
    /// apd), in crystal order — used by [`crate::calibrate`] to search for
    /// the nearest crystal.
    pub fn crystals(&self, p: usize, c: usize, f: usize, m: usize, apd: usize) -> Option<&[CrystalCalibration]> {
        let start = tables::idx_pcfmac(&self.sizes, p, c, f, m, apd, 0);
        self.calibration.get(start..start + self.sizes.crystals_per_apd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config_json() -> String {
        r#"
        {
            "topology": {
                "panels": 1,
                "cartridges_per_panel": 1,
                "daqs_per_cartridge": 1,
                "chips_per_daq": 1,
                "modules_per_chip": 1,
                "fins_per_cartridge": 1,
                "modules_per_fin": 1
            },
            "channel_settings": {
                "spat_a": { "slow_hit_readout": true },
                "spat_b": { "slow_hit_readout": true },
                "spat_c": { "slow_hit_readout": true },
                "spat_d": { "slow_hit_readout": true },
                "com_h": { "slow_hit_readout": true }
            },
            "panels": [
                {
                    "cartridges": [
                        { "daqboard_id": 0, "fins": [ { "modules": [ {} ] } ] }
                    ]
                }
            ]
        }
        "#
        .to_string()
    }

    #[test]
    fn load_resolves_topology_and_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, minimal_config_json()).unwrap();
        let model = SystemModel::load(&path).unwrap();
        assert_eq!(model.sizes().panels, 1);
        assert_eq!(model.lookup_panel_cartridge(0), Some((0, 0)));
        assert_eq!(model.lookup_panel_cartridge(1), None);
        let size = model.packet_size(0, 0, 0, 0, 1).unwrap();
        assert_eq!(size, 10 + 4 * 2 + 4);
    }
}
