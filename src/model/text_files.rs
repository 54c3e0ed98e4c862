//! Line-oriented calibration text file loaders. One line per entity,
//! whitespace-separated, walked in the canonical index sweep order; any
//! malformed column or a total line count that doesn't match the
//! topology's Cartesian product is a fatal [`ConfigError`].

use std::path::Path;

use super::tables::{idx_pcdrm, idx_pcfm, idx_pcfmac};
use super::types::{CrystalCalibration, ModulePedestals, TopologySizes};
use crate::error::ConfigError;

fn parse_field(path: &Path, line_no: usize, column: usize, text: &str) -> Result<f32, ConfigError> {
    text.parse::<f32>().map_err(|_| ConfigError::MalformedColumn {
        path: path.to_path_buf(),
        line: line_no,
        column,
        text: text.to_string(),
    })
}

fn check_line_count(path: &Path, expected: usize, found: usize) -> Result<(), ConfigError> {
    if expected != found {
        return Err(ConfigError::LineCountMismatch {
            path: path.to_path_buf(),
            expected,
            found,
        });
    }
    Ok(())
}

/// Loads pedestals in PCDRM sweep order: one line per module, twelve
/// whitespace-separated float columns in the `ModulePedestals` field order.
pub fn load_pedestals(
    sizes: &TopologySizes,
    path: &Path,
) -> Result<Vec<ModulePedestals>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let expected =
        sizes.panels * sizes.cartridges_per_panel * sizes.daqs_per_cartridge * sizes.chips_per_daq * sizes.modules_per_chip;
    check_line_count(path, expected, lines.len())?;

    let mut table = vec![ModulePedestals::default(); expected];
    let mut i = 0;
    for p in 0..sizes.panels {
        for c in 0..sizes.cartridges_per_panel {
            for d in 0..sizes.daqs_per_cartridge {
                for r in 0..sizes.chips_per_daq {
                    for m in 0..sizes.modules_per_chip {
                        let line_no = i + 1;
                        let cols: Vec<&str> = lines[i].split_whitespace().collect();
                        if cols.len() != 12 {
                            return Err(ConfigError::MalformedColumn {
                                path: path.to_path_buf(),
                                line: line_no,
                                column: cols.len(),
                                text: lines[i].to_string(),
                            });
                        }
                        let f = |col: usize| parse_field(path, line_no, col, cols[col]);
                        let peds = ModulePedestals {
                            a: f(0)?,
                            b: f(1)?,
                            c: f(2)?,
                            d: f(3)?,
                            com0: f(4)?,
                            com1: f(5)?,
                            com0h: f(6)?,
                            com1h: f(7)?,
                            u0h: f(8)?,
                            v0h: f(9)?,
                            u1h: f(10)?,
                            v1h: f(11)?,
                        };
                        table[idx_pcdrm(sizes, p, c, d, r, m)] = peds;
                        i += 1;
                    }
                }
            }
        }
    }
    Ok(table)
}

/// Loads high-gain UV-circle centers in PCFMA sweep order, two columns (u
/// v) per line, overwriting the corresponding `u{0,1}h`/`v{0,1}h` fields of
/// the already-loaded pedestal table (indexed by the module's PCDRM
/// position via the PCFM<->PCDRM bijection the caller already verified).
pub fn load_uv_centers(
    sizes: &TopologySizes,
    path: &Path,
    pedestals: &mut [ModulePedestals],
    pcfm_to_pcdrm: impl Fn(usize, usize, usize, usize) -> Option<(usize, usize, usize)>,
) -> Result<(), ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let expected = sizes.panels
        * sizes.cartridges_per_panel
        * sizes.fins_per_cartridge
        * sizes.modules_per_fin
        * sizes.apds_per_module;
    check_line_count(path, expected, lines.len())?;

    let mut i = 0;
    for p in 0..sizes.panels {
        for c in 0..sizes.cartridges_per_panel {
            for f in 0..sizes.fins_per_cartridge {
                for m in 0..sizes.modules_per_fin {
                    for apd in 0..sizes.apds_per_module {
                        let line_no = i + 1;
                        let cols: Vec<&str> = lines[i].split_whitespace().collect();
                        if cols.len() != 2 {
                            return Err(ConfigError::MalformedColumn {
                                path: path.to_path_buf(),
                                line: line_no,
                                column: cols.len(),
                                text: lines[i].to_string(),
                            });
                        }
                        let u = parse_field(path, line_no, 0, cols[0])?;
                        let v = parse_field(path, line_no, 1, cols[1])?;
                        if let Some((d, r, mc)) = pcfm_to_pcdrm(p, c, f, m) {
                            let entry = &mut pedestals[idx_pcdrm(sizes, p, c, d, r, mc)];
                            match apd {
                                0 => {
                                    entry.u0h = u;
                                    entry.v0h = v;
                                }
                                _ => {
                                    entry.u1h = u;
                                    entry.v1h = v;
                                }
                            }
                        }
                        i += 1;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Loads crystal calibration in PCFMAC sweep order: `use gain_spat
/// gain_comm eres_spat eres_comm x_loc y_loc time_offset` with an optional
/// trailing `time_offset_edep` column (defaults to 0.0 when absent).
pub fn load_calibration(
    sizes: &TopologySizes,
    path: &Path,
) -> Result<Vec<CrystalCalibration>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let expected = sizes.panels
        * sizes.cartridges_per_panel
        * sizes.fins_per_cartridge
        * sizes.modules_per_fin
        * sizes.apds_per_module
        * sizes.crystals_per_apd;
    check_line_count(path, expected, lines.len())?;

    let mut table = vec![CrystalCalibration::default(); expected];
    let mut i = 0;
    for p in 0..sizes.panels {
        for c in 0..sizes.cartridges_per_panel {
            for f in 0..sizes.fins_per_cartridge {
                for m in 0..sizes.modules_per_fin {
                    for apd in 0..sizes.apds_per_module {
                        for crystal in 0..sizes.crystals_per_apd {
                            let line_no = i + 1;
                            let cols: Vec<&str> = lines[i].split_whitespace().collect();
                            if cols.len() != 8 && cols.len() != 9 {
                                return Err(ConfigError::MalformedColumn {
                                    path: path.to_path_buf(),
                                    line: line_no,
                                    column: cols.len(),
                                    text: lines[i].to_string(),
                                });
                            }
                            let used = match cols[0] {
                                "0" => false,
                                "1" => true,
                                _ => {
                                    return Err(ConfigError::MalformedColumn {
                                        path: path.to_path_buf(),
                                        line: line_no,
                                        column: 0,
                                        text: cols[0].to_string(),
                                    })
                                }
                            };
                            let f_at = |col: usize| parse_field(path, line_no, col, cols[col]);
                            let time_offset_edep = if cols.len() == 9 { f_at(8)? } else { 0.0 };
                            table[idx_pcfmac(sizes, p, c, f, m, apd, crystal)] = CrystalCalibration {
                                used,
                                gain_spat: f_at(1)?,
                                gain_comm: f_at(2)?,
                                eres_spat: f_at(3)?,
                                eres_comm: f_at(4)?,
                                x_loc: f_at(5)?,
                                y_loc: f_at(6)?,
                                time_offset: f_at(7)?,
                                time_offset_edep,
                            };
                            i += 1;
                        }
                    }
                }
            }
        }
    }
    Ok(table)
}

/// Loads one time-calibration float per line in PCFMAC sweep order,
/// overwriting `time_offset` on the already-loaded calibration table.
pub fn load_time_calibration(
    sizes: &TopologySizes,
    path: &Path,
    calibration: &mut [CrystalCalibration],
) -> Result<(), ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let expected = sizes.panels
        * sizes.cartridges_per_panel
        * sizes.fins_per_cartridge
        * sizes.modules_per_fin
        * sizes.apds_per_module
        * sizes.crystals_per_apd;
    check_line_count(path, expected, lines.len())?;

    let mut i = 0;
    for p in 0..sizes.panels {
        for c in 0..sizes.cartridges_per_panel {
            for f in 0..sizes.fins_per_cartridge {
                for m in 0..sizes.modules_per_fin {
                    for apd in 0..sizes.apds_per_module {
                        for crystal in 0..sizes.crystals_per_apd {
                            let line_no = i + 1;
                            let value = parse_field(path, line_no, 0, lines[i].trim())?;
                            calibration[idx_pcfmac(sizes, p, c, f, m, apd, crystal)].time_offset = value;
                            i += 1;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes() -> TopologySizes {
        TopologySizes {
            panels: 1,
            cartridges_per_panel: 1,
            daqs_per_cartridge: 1,
            chips_per_daq: 1,
            modules_per_chip: 1,
            fins_per_cartridge: 1,
            modules_per_fin: 1,
            apds_per_module: 1,
            crystals_per_apd: 2,
        }
    }

    #[test]
    fn rejects_wrong_line_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pedestals.txt");
        std::fs::write(&path, "0 0 0 0 0 0 0 0 0 0 0 0\n").unwrap();
        let err = load_pedestals(&sizes(), &path).unwrap_err();
        assert!(matches!(err, ConfigError::LineCountMismatch { .. }));
    }

    #[test]
    fn loads_pedestals_in_pcdrm_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pedestals.txt");
        std::fs::write(&path, "1 2 3 4 5 6 7 8 9 10 11 12\n").unwrap();
        let table = load_pedestals(&sizes(), &path).unwrap();
        assert_eq!(table[0].a, 1.0);
        assert_eq!(table[0].v1h, 12.0);
    }

    #[test]
    fn calibration_defaults_time_offset_edep_when_column_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal.txt");
        std::fs::write(&path, "1 1.0 1.0 0.1 0.1 0.0 0.0 0.0\n1 1.0 1.0 0.1 0.1 0.0 0.0 0.0\n").unwrap();
        let table = load_calibration(&sizes(), &path).unwrap();
        assert_eq!(table[0].time_offset_edep, 0.0);
        assert!(table[0].used);
    }
}
