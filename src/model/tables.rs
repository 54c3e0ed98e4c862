//! Precomputed decode tables: the PCDRM<->PCFM bijection, packet sizes, and
//! ADC slot locations. Ported from the original `convertPCDRMtoPCFM` /
//! `convertPCFMtoPCDRM` / `populateADCLocationLookup` /
//! `populatePacketSizeLookup`, generalized to use the topology's own sizes
//! rather than the hardcoded constants the source assumed.

use super::types::{AdcLocationEntry, ModuleChannelConfig, TopologySizes, NO_ADC_VALUE};

/// Converts (panel, cartridge, daq, chip, module_on_chip) to (fin,
/// module_on_fin). Returns `None` if any index is out of range.
pub fn pcdrm_to_pcfm(
    sizes: &TopologySizes,
    panel: usize,
    cartridge: usize,
    daq: usize,
    chip: usize,
    module_on_chip: usize,
) -> Option<(usize, usize)> {
    if panel >= sizes.panels
        || cartridge >= sizes.cartridges_per_panel
        || daq >= sizes.daqs_per_cartridge
        || chip >= sizes.chips_per_daq
        || module_on_chip >= sizes.modules_per_chip
    {
        return None;
    }

    let mut fin = sizes.fins_per_cartridge as isize - 1 - 2 * (chip / 2) as isize;
    let mut module = module_on_chip;
    if chip % 2 == 1 {
        module += sizes.modules_per_chip;
    }
    if daq % 2 == 1 {
        module += sizes.modules_per_fin / 2;
    }

    if panel == 0 {
        if daq < sizes.daqs_per_cartridge / 2 && sizes.chips_per_daq > 2 {
            fin -= 1;
        }
    } else if panel == 1 {
        if daq >= sizes.daqs_per_cartridge / 2 && sizes.chips_per_daq > 2 {
            fin -= 1;
        }
        module = sizes.modules_per_fin - 1 - module;
    }

    if fin < 0 || fin as usize >= sizes.fins_per_cartridge {
        return None;
    }
    Some((fin as usize, module))
}

/// Converts (panel, cartridge, fin, module_on_fin) to (daq, chip,
/// module_on_chip). Inverse of [`pcdrm_to_pcfm`].
pub fn pcfm_to_pcdrm(
    sizes: &TopologySizes,
    panel: usize,
    cartridge: usize,
    fin: usize,
    module: usize,
) -> Option<(usize, usize, usize)> {
    if panel >= sizes.panels
        || cartridge >= sizes.cartridges_per_panel
        || fin >= sizes.fins_per_cartridge
        || module >= sizes.modules_per_fin
    {
        return None;
    }

    let mut chip = 2 * ((sizes.fins_per_cartridge - 1 - fin) / 2);
    let mut daq = 0usize;
    let half_fin = sizes.modules_per_fin / 2;

    let module_on_chip = if panel == 0 {
        if fin % 2 == 1 && sizes.chips_per_daq > 2 {
            daq += sizes.daqs_per_cartridge / 2;
        }
        if module >= half_fin {
            daq += 1;
        }
        if module % half_fin >= sizes.modules_per_chip {
            chip += 1;
        }
        module % sizes.modules_per_chip
    } else {
        if fin % 2 == 0 && sizes.chips_per_daq > 2 {
            daq += sizes.daqs_per_cartridge / 2;
        }
        if module < half_fin {
            daq += 1;
        }
        if module % half_fin < sizes.modules_per_chip {
            chip += 1;
        }
        sizes.modules_per_chip - 1 - (module % sizes.modules_per_chip)
    };

    if daq >= sizes.daqs_per_cartridge || chip >= sizes.chips_per_daq {
        return None;
    }
    Some((daq, chip, module_on_chip))
}

fn idx_pcdrt(sizes: &TopologySizes, p: usize, c: usize, d: usize, r: usize, t: usize) -> usize {
    (((p * sizes.cartridges_per_panel + c) * sizes.daqs_per_cartridge + d) * sizes.chips_per_daq
        + r)
        * sizes.trigger_codes()
        + t
}

pub fn idx_pcfm(sizes: &TopologySizes, p: usize, c: usize, f: usize, m: usize) -> usize {
    ((p * sizes.cartridges_per_panel + c) * sizes.fins_per_cartridge + f) * sizes.modules_per_fin
        + m
}

pub fn idx_pcfmac(
    sizes: &TopologySizes,
    p: usize,
    c: usize,
    f: usize,
    m: usize,
    apd: usize,
    crystal: usize,
) -> usize {
    (idx_pcfm(sizes, p, c, f, m) * sizes.apds_per_module + apd) * sizes.crystals_per_apd + crystal
}

pub fn idx_pcdrm(sizes: &TopologySizes, p: usize, c: usize, d: usize, r: usize, m: usize) -> usize {
    (((p * sizes.cartridges_per_panel + c) * sizes.daqs_per_cartridge + d) * sizes.chips_per_daq
        + r)
        * sizes.modules_per_chip
        + m
}

/// Builds the packet-size table: `packet_size[p][c][d][r][t] = 10 + sum of
/// 2 bytes per enabled ADC slot over every module whose trigger bit is set`.
pub fn build_packet_size_table(
    sizes: &TopologySizes,
    channel_settings: &[ModuleChannelConfig],
) -> Vec<u32> {
    let count = sizes.panels
        * sizes.cartridges_per_panel
        * sizes.daqs_per_cartridge
        * sizes.chips_per_daq
        * sizes.trigger_codes();
    let mut table = vec![10u32; count];

    for p in 0..sizes.panels {
        for c in 0..sizes.cartridges_per_panel {
            for d in 0..sizes.daqs_per_cartridge {
                for r in 0..sizes.chips_per_daq {
                    for t in 0..sizes.trigger_codes() {
                        let mut size = 10u32;
                        for m in 0..sizes.modules_per_chip {
                            if (t >> m) & 1 == 0 {
                                continue;
                            }
                            let Some((fin, module)) = pcdrm_to_pcfm(sizes, p, c, d, r, m) else {
                                continue;
                            };
                            let cfg = &channel_settings[idx_pcfm(sizes, p, c, fin, module)];
                            if cfg.com_h.fast_hit_readout {
                                size += 8;
                            }
                            if cfg.com_h.slow_hit_readout {
                                size += 4;
                            }
                            if cfg.com_l.fast_hit_readout {
                                size += 8;
                            }
                            if cfg.com_l.slow_hit_readout {
                                size += 4;
                            }
                            for spat in [cfg.spat_a, cfg.spat_b, cfg.spat_c, cfg.spat_d] {
                                if spat.fast_hit_readout {
                                    size += 4;
                                }
                                if spat.slow_hit_readout {
                                    size += 2;
                                }
                            }
                        }
                        table[idx_pcdrt(sizes, p, c, d, r, t)] = size;
                    }
                }
            }
        }
    }
    table
}

/// Builds the ADC-slot location table. For even chips, commons are walked
/// before spatials; for odd chips, spatials (reversed D,C,B,A) are walked
/// before commons. Within a channel the order is value, then u, then v.
pub fn build_adc_location_table(
    sizes: &TopologySizes,
    channel_settings: &[ModuleChannelConfig],
) -> Vec<AdcLocationEntry> {
    let count = sizes.panels
        * sizes.cartridges_per_panel
        * sizes.daqs_per_cartridge
        * sizes.chips_per_daq
        * sizes.trigger_codes()
        * sizes.modules_per_chip;
    let mut table = vec![AdcLocationEntry::default(); count];

    for p in 0..sizes.panels {
        for c in 0..sizes.cartridges_per_panel {
            for d in 0..sizes.daqs_per_cartridge {
                for r in 0..sizes.chips_per_daq {
                    for t in 0..sizes.trigger_codes() {
                        let mut cursor = 0usize;
                        if r % 2 == 1 {
                            walk_spatials(sizes, channel_settings, p, c, d, r, t, &mut cursor, &mut table);
                            walk_commons(sizes, channel_settings, p, c, d, r, t, &mut cursor, &mut table);
                        } else {
                            walk_commons(sizes, channel_settings, p, c, d, r, t, &mut cursor, &mut table);
                            walk_spatials(sizes, channel_settings, p, c, d, r, t, &mut cursor, &mut table);
                        }
                    }
                }
            }
        }
    }
    table
}

// RawEvent / AdcLocationEntry slot order.
const A: usize = 0;
const B: usize = 1;
const C: usize = 2;
const D: usize = 3;
const COM0: usize = 4;
const COM1: usize = 5;
const COM0H: usize = 6;
const COM1H: usize = 7;
const U0: usize = 8;
const V0: usize = 9;
const U1: usize = 10;
const V1: usize = 11;
const U0H: usize = 12;
const V0H: usize = 13;
const U1H: usize = 14;
const V1H: usize = 15;

#[allow(clippy::too_many_arguments)]
fn walk_commons(
    sizes: &TopologySizes,
    channel_settings: &[ModuleChannelConfig],
    p: usize,
    c: usize,
    d: usize,
    r: usize,
    t: usize,
    cursor: &mut usize,
    table: &mut [AdcLocationEntry],
) {
    for m in 0..sizes.modules_per_chip {
        let entry = &mut table[idx_pcdrtm(sizes, p, c, d, r, t, m)];
        let Some((fin, module)) = pcdrm_to_pcfm(sizes, p, c, d, r, m) else {
            continue;
        };
        if (t >> m) & 1 == 0 {
            continue;
        }
        entry.triggered = true;
        let cfg = &channel_settings[idx_pcfm(sizes, p, c, fin, module)];
        if cfg.com_h.slow_hit_readout {
            entry.slots[COM0H] = *cursor;
            *cursor += 1;
        }
        if cfg.com_h.fast_hit_readout {
            entry.slots[U0H] = *cursor;
            *cursor += 1;
            entry.slots[V0H] = *cursor;
            *cursor += 1;
        }
        if cfg.com_l.slow_hit_readout {
            entry.slots[COM0] = *cursor;
            *cursor += 1;
        }
        if cfg.com_l.fast_hit_readout {
            entry.slots[U0] = *cursor;
            *cursor += 1;
            entry.slots[V0] = *cursor;
            *cursor += 1;
        }
        if cfg.com_h.slow_hit_readout {
            entry.slots[COM1H] = *cursor;
            *cursor += 1;
        }
        if cfg.com_h.fast_hit_readout {
            entry.slots[U1H] = *cursor;
            *cursor += 1;
            entry.slots[V1H] = *cursor;
            *cursor += 1;
        }
        if cfg.com_l.slow_hit_readout {
            entry.slots[COM1] = *cursor;
            *cursor += 1;
        }
        if cfg.com_l.fast_hit_readout {
            entry.slots[U1] = *cursor;
            *cursor += 1;
            entry.slots[V1] = *cursor;
            *cursor += 1;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn walk_spatials(
    sizes: &TopologySizes,
    channel_settings: &[ModuleChannelConfig],
    p: usize,
    c: usize,
    d: usize,
    r: usize,
    t: usize,
    cursor: &mut usize,
    table: &mut [AdcLocationEntry],
) {
    for m in 0..sizes.modules_per_chip {
        let entry = &mut table[idx_pcdrtm(sizes, p, c, d, r, t, m)];
        let Some((fin, module)) = pcdrm_to_pcfm(sizes, p, c, d, r, m) else {
            continue;
        };
        if (t >> m) & 1 == 0 {
            continue;
        }
        entry.triggered = true;
        let cfg = &channel_settings[idx_pcfm(sizes, p, c, fin, module)];
        let order: [(usize, super::types::RenaChannelConfig); 4] = if r % 2 == 1 {
            [(D, cfg.spat_d), (C, cfg.spat_c), (B, cfg.spat_b), (A, cfg.spat_a)]
        } else {
            [(A, cfg.spat_a), (B, cfg.spat_b), (C, cfg.spat_c), (D, cfg.spat_d)]
        };
        // Spatial channels carry only a value slot in AdcLocationEntry, but a
        // fast_hit_readout channel still transmits two timing-circle ADC
        // values on the wire (discarded here, matching EventRaw's lack of
        // spatial u/v fields) and the cursor must advance past them or every
        // later channel's offsets shift.
        for (ch, rena_cfg) in order {
            if rena_cfg.slow_hit_readout {
                entry.slots[ch] = *cursor;
                *cursor += 1;
            }
            if rena_cfg.fast_hit_readout {
                *cursor += 2;
            }
        }
    }
}

fn idx_pcdrtm(
    sizes: &TopologySizes,
    p: usize,
    c: usize,
    d: usize,
    r: usize,
    t: usize,
    m: usize,
) -> usize {
    idx_pcdrt(sizes, p, c, d, r, t) * sizes.modules_per_chip + m
}

/// 32-entry reverse lookup from the 5-bit backend address byte to (panel,
/// cartridge). `None` marks an address with no configured cartridge.
pub fn build_backend_address_table(
    sizes: &TopologySizes,
    daqboard_ids: &[u32],
) -> Vec<Option<(usize, usize)>> {
    let mut table = vec![None; 32];
    for p in 0..sizes.panels {
        for c in 0..sizes.cartridges_per_panel {
            let id = daqboard_ids[p * sizes.cartridges_per_panel + c] as usize;
            if id < table.len() {
                table[id] = Some((p, c));
            }
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes() -> TopologySizes {
        TopologySizes {
            panels: 2,
            cartridges_per_panel: 2,
            daqs_per_cartridge: 4,
            chips_per_daq: 4,
            modules_per_chip: 4,
            fins_per_cartridge: 8,
            modules_per_fin: 16,
            apds_per_module: 2,
            crystals_per_apd: 64,
        }
    }

    #[test]
    fn pcdrm_pcfm_round_trips() {
        let s = sizes();
        for p in 0..s.panels {
            for c in 0..s.cartridges_per_panel {
                for d in 0..s.daqs_per_cartridge {
                    for r in 0..s.chips_per_daq {
                        for m in 0..s.modules_per_chip {
                            let (fin, module) = pcdrm_to_pcfm(&s, p, c, d, r, m)
                                .unwrap_or_else(|| panic!("no fin/module for {p} {c} {d} {r} {m}"));
                            let (d2, r2, m2) = pcfm_to_pcdrm(&s, p, c, fin, module)
                                .unwrap_or_else(|| panic!("no round trip for {p} {c} {fin} {module}"));
                            assert_eq!((d, r, m), (d2, r2, m2));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn packet_size_is_header_plus_triggered_channels() {
        let s = sizes();
        let mut settings = vec![ModuleChannelConfig::default(); s.panels
            * s.cartridges_per_panel
            * s.fins_per_cartridge
            * s.modules_per_fin];
        for cfg in settings.iter_mut() {
            cfg.spat_a.slow_hit_readout = true;
            cfg.spat_b.slow_hit_readout = true;
            cfg.spat_c.slow_hit_readout = true;
            cfg.spat_d.slow_hit_readout = true;
            cfg.com_h.slow_hit_readout = true;
        }
        let table = build_packet_size_table(&s, &settings);
        // trigger_code = 1 triggers exactly one module: 10 header bytes +
        // 4 spatials * 2 bytes + 1 common(H) * 2 bytes (com0h and com1h = 4)
        let size = table[idx_pcdrt(&s, 0, 0, 0, 0, 0b0001)];
        assert_eq!(size, 10 + 4 * 2 + 4);
    }

    #[test]
    fn triggered_flag_matches_trigger_code_bit() {
        let s = sizes();
        let settings = vec![ModuleChannelConfig::default(); s.panels
            * s.cartridges_per_panel
            * s.fins_per_cartridge
            * s.modules_per_fin];
        let table = build_adc_location_table(&s, &settings);
        for t in 0..s.trigger_codes() {
            for m in 0..s.modules_per_chip {
                let entry = &table[idx_pcdrtm(&s, 0, 0, 0, 0, t, m)];
                assert_eq!(entry.triggered, (t >> m) & 1 == 1);
            }
        }
    }

    #[test]
    fn spatial_fast_hit_readout_advances_cursor_past_discarded_uv_slots() {
        let s = sizes();
        let mut settings = vec![ModuleChannelConfig::default(); s.panels
            * s.cartridges_per_panel
            * s.fins_per_cartridge
            * s.modules_per_fin];
        for cfg in settings.iter_mut() {
            cfg.spat_a.slow_hit_readout = true;
            cfg.spat_a.fast_hit_readout = true;
            cfg.com_h.slow_hit_readout = true;
        }
        // r=1 is an odd chip: spatials are walked before commons, so the two
        // discarded fast_hit_readout slots for spat_a sit between A's value
        // slot and COM0H's.
        let table = build_adc_location_table(&s, &settings);
        let entry = &table[idx_pcdrtm(&s, 0, 0, 0, 1, 0b0001, 0)];
        assert_eq!(entry.slots[A], 0);
        assert_eq!(entry.slots[COM0H], 3);
        assert_eq!(entry.slots[COM1H], 4);

        let size = build_packet_size_table(&s, &settings)[idx_pcdrt(&s, 0, 0, 0, 1, 0b0001)];
        assert_eq!(size, 20);
    }
}
