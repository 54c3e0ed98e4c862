//! End-to-end scenarios exercising more than one module together.

use std::sync::Arc;
use std::time::Duration;

use pet_daq::calibrate::raw_to_cal;
use pet_daq::decode::{decode, new_scratch};
use pet_daq::error::DecodeReject;
use pet_daq::event::CalEvent;
use pet_daq::model::SystemModel;
use pet_daq::pipeline::{PipelineController, PipelineStream, StreamConfig};
use pet_daq::sort::{insertion_sort, partition_releasable};
use pet_daq::socket::FakeSocket;

fn single_module_config_json() -> &'static str {
    r#"
    {
        "topology": {
            "panels": 1, "cartridges_per_panel": 1, "daqs_per_cartridge": 1,
            "chips_per_daq": 1, "modules_per_chip": 1,
            "fins_per_cartridge": 1, "modules_per_fin": 1,
            "crystals_per_apd": 1
        },
        "channel_settings": {
            "hit_threshold": 10000,
            "double_trigger_threshold": -10000,
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
    "#
}

fn single_module_model(dir: &std::path::Path) -> SystemModel {
    let config_path = dir.join("config.json");
    std::fs::write(&config_path, single_module_config_json()).unwrap();
    let mut model = SystemModel::load(&config_path).unwrap();

    let cal_path = dir.join("cal.txt");
    std::fs::write(
        &cal_path,
        "1 1.0 1.0 0.0 0.0 0.0 0.0 0.0\n1 1.0 1.0 0.0 0.0 0.0 0.0 0.0\n",
    )
    .unwrap();
    model.load_calibration(&cal_path).unwrap();
    model
}

fn pack_adc(value: u16) -> [u8; 2] {
    [((value >> 6) & 0x3F) as u8, (value & 0x3F) as u8]
}

fn minimal_packet() -> Vec<u8> {
    let mut bytes = vec![0x80u8, 0x00, 0x01, 0, 0, 0, 0, 0, 0];
    for v in [3000u16, 3100, 100, 200, 300, 400] {
        bytes.extend_from_slice(&pack_adc(v));
    }
    bytes.push(0x81);
    bytes
}

#[test]
fn s1_minimal_packet_decodes_and_calibrates() {
    let dir = tempfile::tempdir().unwrap();
    let model = single_module_model(dir.path());
    let bytes = minimal_packet();

    let mut scratch = new_scratch();
    let mut raw_events = Vec::new();
    decode(&bytes, &model, &mut scratch, &mut raw_events).unwrap();
    assert_eq!(raw_events.len(), 1);
    assert_eq!(raw_events[0].a, 100);
    assert_eq!(raw_events[0].com0h, 3000);

    let cal = raw_to_cal(&raw_events[0], &model).unwrap();
    let sum = 100.0 + 200.0 + 300.0 + 400.0;
    assert!((cal.x - ((300.0 + 400.0) - (100.0 + 200.0)) / sum).abs() < 1e-5);
    assert!((cal.y - ((100.0 + 400.0) - (200.0 + 300.0)) / sum).abs() < 1e-5);
    assert_eq!(cal.apd, 0);
    assert_eq!(cal.crystal, 0);
}

#[test]
fn s2_missing_stop_byte_is_bad_framing() {
    let dir = tempfile::tempdir().unwrap();
    let model = single_module_model(dir.path());
    let mut bytes = minimal_packet();
    bytes.pop();

    let mut scratch = new_scratch();
    let mut out = Vec::new();
    let err = decode(&bytes, &model, &mut scratch, &mut out).unwrap_err();
    assert_eq!(err, DecodeReject::BadFraming);
}

#[test]
fn s3_zero_trigger_code_is_empty_trigger() {
    let dir = tempfile::tempdir().unwrap();
    let model = single_module_model(dir.path());
    let bytes = vec![0x80u8, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0x81];

    let mut scratch = new_scratch();
    let mut out = Vec::new();
    let err = decode(&bytes, &model, &mut scratch, &mut out).unwrap_err();
    assert_eq!(err, DecodeReject::EmptyTrigger);
}

#[test]
fn s4_short_packet_is_bad_size() {
    let dir = tempfile::tempdir().unwrap();
    let model = single_module_model(dir.path());
    let mut bytes = minimal_packet();
    let stop = bytes.pop().unwrap();
    bytes.pop();
    bytes.pop();
    bytes.push(stop);

    let mut scratch = new_scratch();
    let mut out = Vec::new();
    let err = decode(&bytes, &model, &mut scratch, &mut out).unwrap_err();
    assert_eq!(err, DecodeReject::BadSize);
}

fn cal_event(ct: i64, ft: f32) -> CalEvent {
    CalEvent {
        ct,
        ft,
        energy: 511.0,
        spatial_total: 1000.0,
        x: 0.0,
        y: 0.0,
        panel: 0,
        cartridge: 0,
        fin: 0,
        module: 0,
        apd: 0,
        crystal: 0,
        daq: 0,
        chip: 0,
    }
}

#[test]
fn s5_near_sort_releases_only_events_behind_horizon() {
    let mut events = vec![cal_event(1000, 0.0), cal_event(500, 0.0)];
    insertion_sort(&mut events, |a, b| (a.ct, a.ft.to_bits()) < (b.ct, b.ft.to_bits()));
    let horizon = events.last().unwrap().ct - 100;
    let released = partition_releasable(&mut events, horizon);
    assert_eq!(released.iter().map(|e| e.ct).collect::<Vec<_>>(), vec![500]);
    assert_eq!(events.iter().map(|e| e.ct).collect::<Vec<_>>(), vec![1000]);
}

#[test]
fn s6_split_files_produce_paired_splits_across_streams() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(single_module_model(dir.path()));
    let total_streams = 2;

    let mut streams = Vec::new();
    for i in 0..total_streams {
        let packet: Vec<u8> = (0..2000u32).map(|b| (b % 256) as u8).collect();
        let socket = Arc::new(FakeSocket::new(vec![packet], Duration::from_millis(20)));
        let config = StreamConfig {
            split_files: true,
            file_size_max: 1024,
            sort_calibrated_events: false,
            pull_timeout: Duration::from_millis(50),
            ..StreamConfig::default()
        };
        let raw_path = dir.path().join(format!("stream{i}.raw"));
        let decoded_path = dir.path().join(format!("stream{i}.decoded"));
        let cal_path = dir.path().join(format!("stream{i}.cal"));
        streams.push(
            PipelineStream::new(i, socket, Arc::clone(&model), config, raw_path, decoded_path, cal_path).unwrap(),
        );
    }

    let controller = PipelineController::new(streams);
    controller.start();
    std::thread::sleep(Duration::from_millis(300));
    controller.stop(true);

    for i in 0..total_streams {
        let split0 = dir.path().join(format!("stream{i}_000.raw"));
        let split1 = dir.path().join(format!("stream{i}_001.raw"));
        assert!(split0.exists(), "stream {i} missing _000 split");
        assert!(split1.exists(), "stream {i} missing _001 split");
    }
}
