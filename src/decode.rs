//! Stateless packet -> [`RawEvent`] decoding.

use crate::error::DecodeReject;
use crate::event::RawEvent;
use crate::model::{SystemModel, NO_ADC_VALUE};

/// Caller-owned scratch buffer sized for every ADC slot plus one always-zero
/// sentinel cell at index [`NO_ADC_VALUE`].
pub type AdcScratch = [i16; NO_ADC_VALUE + 1];

pub fn new_scratch() -> AdcScratch {
    [0i16; NO_ADC_VALUE + 1]
}

/// Decodes one framed packet into zero or more [`RawEvent`]s, appended to
/// `out`. Pure: the same bytes, model, and (zeroed) scratch buffer always
/// produce the same events. `scratch` is caller-owned so the function has
/// no hidden state and is trivially unit-testable.
pub fn decode(
    bytes: &[u8],
    model: &SystemModel,
    scratch: &mut AdcScratch,
    out: &mut Vec<RawEvent>,
) -> Result<(), DecodeReject> {
    if bytes.is_empty() {
        return Err(DecodeReject::EmptyBytes);
    }
    if bytes.len() < 10 || bytes[0] != 0x80 || *bytes.last().unwrap() != 0x81 {
        return Err(DecodeReject::BadFraming);
    }

    let b1 = bytes[1];
    let backend_address = ((b1 >> 2) & 0x1F) as usize;
    let daq_board = (b1 & 0x3) as usize;

    let b2 = bytes[2];
    let fpga = (b2 >> 4) & 0x3;
    let chip = (2 * fpga + ((b2 >> 6) & 1)) as usize;
    let trigger_code = (b2 & 0xF) as usize;
    if trigger_code == 0 {
        return Err(DecodeReject::EmptyTrigger);
    }

    let (panel, cartridge) = model
        .lookup_panel_cartridge(backend_address)
        .ok_or(DecodeReject::InvalidAddress)?;

    let expected_size = model
        .packet_size(panel, cartridge, daq_board, chip, trigger_code)
        .ok_or(DecodeReject::InvalidAddress)?;
    if bytes.len() != expected_size as usize {
        return Err(DecodeReject::BadSize);
    }

    let mut ts: i64 = 0;
    for &byte in &bytes[3..9] {
        ts = (ts << 7) | (byte & 0x7F) as i64;
    }

    for slot in scratch.iter_mut() {
        *slot = 0;
    }
    let payload = &bytes[9..bytes.len() - 1];
    for (i, pair) in payload.chunks_exact(2).enumerate() {
        if i >= NO_ADC_VALUE {
            break;
        }
        let hi = (pair[0] & 0x3F) as u16;
        let lo = (pair[1] & 0x3F) as u16;
        scratch[i] = ((hi << 6) | lo) as i16;
    }

    let locations = model
        .adc_locations(panel, cartridge, daq_board, chip, trigger_code)
        .ok_or(DecodeReject::InvalidAddress)?;

    for (m, entry) in locations.iter().enumerate() {
        if !entry.triggered {
            continue;
        }
        let s = entry.slots;
        out.push(RawEvent {
            ct: ts,
            a: scratch[s[0]],
            b: scratch[s[1]],
            c: scratch[s[2]],
            d: scratch[s[3]],
            com0: scratch[s[4]],
            com1: scratch[s[5]],
            com0h: scratch[s[6]],
            com1h: scratch[s[7]],
            u0: scratch[s[8]],
            v0: scratch[s[9]],
            u1: scratch[s[10]],
            v1: scratch[s[11]],
            u0h: scratch[s[12]],
            v0h: scratch[s[13]],
            u1h: scratch[s[14]],
            v1h: scratch[s[15]],
            panel: panel as u8,
            cartridge: cartridge as u8,
            daq: daq_board as u8,
            chip: chip as u8,
            module: m as u8,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::ConfigTree;
    use std::path::Path;

    fn single_module_model() -> SystemModel {
        let json = r#"
        {
            "topology": {
                "panels": 1, "cartridges_per_panel": 1, "daqs_per_cartridge": 1,
                "chips_per_daq": 1, "modules_per_chip": 1,
                "fins_per_cartridge": 1, "modules_per_fin": 1
            },
            "channel_settings": {
                "spat_a": { "slow_hit_readout": true },
                "spat_b": { "slow_hit_readout": true },
                "spat_c": { "slow_hit_readout": true },
                "spat_d": { "slow_hit_readout": true },
                "com_h": { "slow_hit_readout": true }
            },
            "panels": [
                { "cartridges": [ { "daqboard_id": 0, "fins": [ { "modules": [ {} ] } ] } ] }
            ]
        }
        "#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, json).unwrap();
        let _ = ConfigTree::load(Path::new(&path)).unwrap();
        SystemModel::load(&path).unwrap()
    }

    fn pack_adc(value: u16) -> [u8; 2] {
        [(((value >> 6) & 0x3F) as u8), ((value & 0x3F) as u8)]
    }

    #[test]
    fn decodes_minimal_single_module_packet() {
        let model = single_module_model();
        let mut bytes = vec![0x80u8, 0x00, 0x01, 0, 0, 0, 0, 0, 0];
        // even chip: commons (com0h, com1h) walked before spatials (A,B,C,D)
        for v in [3000u16, 3100, 100, 200, 300, 400] {
            bytes.extend_from_slice(&pack_adc(v));
        }
        bytes.push(0x81);

        let mut scratch = new_scratch();
        let mut out = Vec::new();
        decode(&bytes, &model, &mut scratch, &mut out).unwrap();
        assert_eq!(out.len(), 1);
        let ev = out[0];
        assert_eq!(ev.com0h, 3000);
        assert_eq!(ev.com1h, 3100);
        assert_eq!(ev.a, 100);
        assert_eq!(ev.b, 200);
        assert_eq!(ev.c, 300);
        assert_eq!(ev.d, 400);
        assert_eq!(ev.panel, 0);
        assert_eq!(ev.module, 0);
    }

    #[test]
    fn missing_stop_byte_is_bad_framing() {
        let model = single_module_model();
        let bytes = vec![0x80u8, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut scratch = new_scratch();
        let mut out = Vec::new();
        let err = decode(&bytes, &model, &mut scratch, &mut out).unwrap_err();
        assert_eq!(err, DecodeReject::BadFraming);
    }

    #[test]
    fn zero_trigger_code_is_empty_trigger() {
        let model = single_module_model();
        let bytes = vec![0x80u8, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0x81];
        let mut scratch = new_scratch();
        let mut out = Vec::new();
        let err = decode(&bytes, &model, &mut scratch, &mut out).unwrap_err();
        assert_eq!(err, DecodeReject::EmptyTrigger);
    }

    #[test]
    fn short_packet_is_bad_size() {
        let model = single_module_model();
        let mut bytes = vec![0x80u8, 0x00, 0x01, 0, 0, 0, 0, 0, 0];
        for v in [3000u16, 100, 200, 300] {
            bytes.extend_from_slice(&pack_adc(v));
        }
        bytes.push(0x81);
        let mut scratch = new_scratch();
        let mut out = Vec::new();
        let err = decode(&bytes, &model, &mut scratch, &mut out).unwrap_err();
        assert_eq!(err, DecodeReject::BadSize);
    }

    #[test]
    fn decode_is_pure() {
        let model = single_module_model();
        let mut bytes = vec![0x80u8, 0x00, 0x01, 0, 0, 0, 0, 0, 0];
        for v in [3000u16, 3100, 100, 200, 300, 400] {
            bytes.extend_from_slice(&pack_adc(v));
        }
        bytes.push(0x81);

        let mut scratch_a = new_scratch();
        let mut out_a = Vec::new();
        decode(&bytes, &model, &mut scratch_a, &mut out_a).unwrap();

        let mut scratch_b = new_scratch();
        let mut out_b = Vec::new();
        decode(&bytes, &model, &mut scratch_b, &mut out_b).unwrap();

        assert_eq!(out_a, out_b);
    }
}
