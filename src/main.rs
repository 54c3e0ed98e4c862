use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use pet_daq::calibrate::{raw_to_cal, raw_to_xy_energy};
use pet_daq::cli::{Cli, Command, DecodeDumpArgs, RunArgs};
use pet_daq::decode::{decode, new_scratch};
use pet_daq::model::SystemModel;
use pet_daq::pipeline::{PipelineController, PipelineStream, StreamConfig};
use pet_daq::socket::UdpDaqSocket;

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(args) => run(args),
        Command::CheckConfig(args) => check_config(&args.config),
        Command::DecodeDump(args) => decode_dump(&args),
    };

    if let Err(err) = result {
        eprintln!("pet-daq: {err}");
        std::process::exit(1);
    }
}

fn check_config(config_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let model = SystemModel::load(config_path)?;
    let sizes = model.sizes();
    println!("panels: {}", sizes.panels);
    println!("cartridges_per_panel: {}", sizes.cartridges_per_panel);
    println!("daqs_per_cartridge: {}", sizes.daqs_per_cartridge);
    println!("chips_per_daq: {}", sizes.chips_per_daq);
    println!("modules_per_chip: {}", sizes.modules_per_chip);
    println!("fins_per_cartridge: {}", sizes.fins_per_cartridge);
    println!("modules_per_fin: {}", sizes.modules_per_fin);
    println!("apds_per_module: {}", sizes.apds_per_module);
    println!("crystals_per_apd: {}", sizes.crystals_per_apd);
    println!("configuration OK");
    Ok(())
}

fn decode_dump(args: &DecodeDumpArgs) -> Result<(), Box<dyn std::error::Error>> {
    let model = SystemModel::load(&args.config)?;
    let mut bytes = Vec::new();
    File::open(&args.input)?.read_to_end(&mut bytes)?;

    let mut scratch = new_scratch();
    let mut raw_events = Vec::new();
    let mut start = None;
    let mut decoded_count = 0usize;
    let mut rejected_count = 0usize;
    for (i, &byte) in bytes.iter().enumerate() {
        match byte {
            0x80 => start = Some(i),
            0x81 => {
                if let Some(s) = start.take() {
                    match decode(&bytes[s..=i], &model, &mut scratch, &mut raw_events) {
                        Ok(()) => decoded_count += 1,
                        Err(e) => {
                            rejected_count += 1;
                            log::debug!("decode rejected: {e:?}");
                        }
                    }
                }
            }
            _ => {}
        }
    }
    println!("packets decoded: {decoded_count}, rejected: {rejected_count}");
    println!("raw events: {}", raw_events.len());

    if args.calibrate {
        let mut calibrated = 0usize;
        let mut cal_rejected = 0usize;
        for raw in &raw_events {
            let result = if args.pedestal_only {
                raw_to_xy_energy(raw, &model)
            } else {
                raw_to_cal(raw, &model)
            };
            match result {
                Ok(cal) => {
                    calibrated += 1;
                    if args.verbose {
                        println!(
                            "ct={} ft={:.2} energy={:.1} x={:.3} y={:.3} crystal={}",
                            cal.ct, cal.ft, cal.energy, cal.x, cal.y, cal.crystal
                        );
                    }
                }
                Err(e) => {
                    cal_rejected += 1;
                    log::debug!("calibrate rejected: {e:?}");
                }
            }
        }
        println!("calibrated events: {calibrated}, rejected: {cal_rejected}");
    } else if args.verbose {
        for raw in &raw_events {
            println!(
                "ct={} panel={} cartridge={} daq={} chip={} module={}",
                raw.ct, raw.panel, raw.cartridge, raw.daq, raw.chip, raw.module
            );
        }
    }

    Ok(())
}

struct Endpoint {
    panel: usize,
    cartridge: usize,
    addr: String,
}

fn parse_endpoint(spec: &str) -> Result<Endpoint, String> {
    let (topology, addr) = spec.split_once('=').ok_or_else(|| format!("malformed endpoint {spec}, expected PANEL:CARTRIDGE=ADDR"))?;
    let (panel, cartridge) = topology
        .split_once(':')
        .ok_or_else(|| format!("malformed endpoint {spec}, expected PANEL:CARTRIDGE=ADDR"))?;
    let panel: usize = panel.parse().map_err(|_| format!("invalid panel in endpoint {spec}"))?;
    let cartridge: usize = cartridge.parse().map_err(|_| format!("invalid cartridge in endpoint {spec}"))?;
    Ok(Endpoint { panel, cartridge, addr: addr.to_string() })
}

fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut model = SystemModel::load(&args.config)?;
    if let Some(path) = &args.pedestals {
        model.load_pedestals(path)?;
    }
    if let Some(path) = &args.uv_centers {
        model.load_uv_centers(path)?;
    }
    if let Some(path) = &args.calibration {
        model.load_calibration(path)?;
    }
    if let Some(path) = &args.time_calibration {
        model.load_time_calibration(path)?;
    }
    let model = Arc::new(model);

    std::fs::create_dir_all(&args.output_dir)?;

    let mut streams = Vec::new();
    for (idx, spec) in args.endpoints.iter().enumerate() {
        let endpoint = parse_endpoint(spec)?;
        let socket = UdpDaqSocket::bind(endpoint.addr.as_str(), Duration::from_millis(150))?;
        let mut config = StreamConfig::default();
        if let Some(max) = args.file_size_max {
            config.split_files = true;
            config.file_size_max = max;
        }
        config.energy_gate = args.energy_gate;

        let basename = format!("panel{}_cartridge{}", endpoint.panel, endpoint.cartridge);
        let raw_path = args.output_dir.join(format!("{basename}.raw"));
        let decoded_path = args.output_dir.join(format!("{basename}.decoded"));
        let calibrated_path = args.output_dir.join(format!("{basename}.cal"));

        streams.push(PipelineStream::new(
            idx,
            Arc::new(socket),
            Arc::clone(&model),
            config,
            raw_path,
            decoded_path,
            calibrated_path,
        )?);
    }

    let controller = Arc::new(PipelineController::new(streams));
    controller.start();
    log::info!("pipeline started with {} stream(s)", controller.stream_count());

    let shutdown_requested = Arc::new(AtomicBool::new(false));
    let ctrlc_flag = Arc::clone(&shutdown_requested);
    ctrlc::set_handler(move || {
        ctrlc_flag.store(true, Ordering::SeqCst);
    })?;

    while !shutdown_requested.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_secs(args.status_interval_secs));
        for idx in 0..controller.stream_count() {
            let snapshot = controller.process_info(idx);
            log::info!("stream {idx}:\n{snapshot}");
        }
    }

    log::info!("shutting down");
    controller.stop(true);
    Ok(())
}
