//! Stateless [`RawEvent`] -> [`CalEvent`] calibration: APD selection, anger
//! logic, fine time, crystal identification, energy scaling, time offset.

use crate::error::CalReject;
use crate::event::{CalEvent, RawEvent};
use crate::model::SystemModel;

fn fine_calc(u: i16, v: i16, u_cent: f32, v_cent: f32, uv_period_ns: f32) -> f32 {
    let mut tmp = (u as f32 - u_cent).atan2(v as f32 - v_cent);
    if tmp < 0.0 {
        tmp += 2.0 * std::f32::consts::PI;
    }
    tmp /= 2.0 * std::f32::consts::PI;
    tmp * uv_period_ns
}

/// Finds the crystal whose `(x_loc, y_loc)` is nearest `(x, y)` among the 64
/// crystals for one (panel, cartridge, fin, module, apd). Returns
/// `OutOfBounds` if the flood position is outside the unit square,
/// `InvalidCrystal` if the nearest crystal's `used` flag is false.
fn identify_crystal(
    model: &SystemModel,
    p: usize,
    c: usize,
    fin: usize,
    module: usize,
    apd: usize,
    x: f32,
    y: f32,
) -> Result<u8, CalReject> {
    if x.abs() > 1.0 || y.abs() > 1.0 {
        return Err(CalReject::OutOfBounds);
    }
    let crystals = model
        .crystals(p, c, fin, module, apd)
        .ok_or(CalReject::TopologyError)?;
    let mut best = 0usize;
    let mut best_dist = f64::MAX;
    for (i, cal) in crystals.iter().enumerate() {
        let dx = (cal.x_loc - x) as f64;
        let dy = (cal.y_loc - y) as f64;
        let dist = dx * dx + dy * dy;
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    if !crystals[best].used {
        return Err(CalReject::InvalidCrystal);
    }
    Ok(best as u8)
}

/// Full calibration pipeline: pedestal subtraction, APD selection,
/// threshold gating, anger-logic position, fine time, crystal
/// identification, energy and time-offset calibration.
pub fn raw_to_cal(raw: &RawEvent, model: &SystemModel) -> Result<CalEvent, CalReject> {
    let (fin, module) = model
        .pcdrm_to_pcfm(
            raw.panel as usize,
            raw.cartridge as usize,
            raw.daq as usize,
            raw.chip as usize,
            raw.module as usize,
        )
        .ok_or(CalReject::TopologyError)?;

    let peds = model
        .pedestals(
            raw.panel as usize,
            raw.cartridge as usize,
            raw.daq as usize,
            raw.chip as usize,
            raw.module as usize,
        )
        .ok_or(CalReject::TopologyError)?;
    let cfg = model
        .module_channel_settings(raw.panel as usize, raw.cartridge as usize, fin, module)
        .ok_or(CalReject::TopologyError)?;

    // The common channels go negative; "smaller" signal value means
    // "larger" energy, so the APD with the smaller reading is primary.
    // Subtract in float, then truncate the difference, since pedestals are
    // rarely integral.
    let mut p0 = (raw.com0h as f32 - peds.com0h) as i16;
    let mut p1 = (raw.com1h as f32 - peds.com1h) as i16;
    let mut apd = 0u8;
    if p0 > p1 {
        apd = 1;
        std::mem::swap(&mut p0, &mut p1);
    }
    let (primary, secondary) = (p0, p1);

    if primary as i32 > cfg.hit_threshold {
        return Err(CalReject::BelowThreshold);
    }
    if (secondary as i32) < cfg.double_trigger_threshold {
        return Err(CalReject::DoubleTrigger);
    }

    let a = raw.a as f32 - peds.a;
    let b = raw.b as f32 - peds.b;
    let c = raw.c as f32 - peds.c;
    let d = raw.d as f32 - peds.d;
    let spat_total = a + b + c + d;
    let x = ((c + d) - (a + b)) / spat_total;
    let mut y = ((a + d) - (b + c)) / spat_total;
    if apd == 1 {
        y *= -1.0;
    }

    let mut ft = if apd == 1 {
        fine_calc(raw.u1h, raw.v1h, peds.u1h, peds.v1h, model.uv_period_ns())
    } else {
        fine_calc(raw.u0h, raw.v0h, peds.u0h, peds.v0h, model.uv_period_ns())
    };

    let crystal = identify_crystal(
        model,
        raw.panel as usize,
        raw.cartridge as usize,
        fin,
        module,
        apd as usize,
        x,
        y,
    )?;
    let crystal_cal = model
        .calibration(
            raw.panel as usize,
            raw.cartridge as usize,
            fin,
            module,
            apd as usize,
            crystal as usize,
        )
        .ok_or(CalReject::TopologyError)?;

    let energy = spat_total / crystal_cal.gain_spat * 511.0;

    ft -= crystal_cal.time_offset;
    ft -= (energy - 511.0) * crystal_cal.time_offset_edep;
    let period = model.uv_period_ns();
    while ft < 0.0 {
        ft += period;
    }
    while ft >= period {
        ft -= period;
    }

    Ok(CalEvent {
        ct: raw.ct,
        ft,
        energy,
        spatial_total: spat_total,
        x,
        y,
        panel: raw.panel,
        cartridge: raw.cartridge,
        fin: fin as u8,
        module: module as u8,
        apd,
        crystal,
        daq: raw.daq,
        chip: raw.chip,
    })
}

/// Reduced-dependency sibling of [`raw_to_cal`] that skips crystal
/// identification and the full gain calibration, using the low-gain common
/// channel directly as a pedestal-only energy estimate. Used by
/// `decode-dump --calibrate --pedestal-only` before a gain calibration has
/// been loaded.
pub fn raw_to_xy_energy(raw: &RawEvent, model: &SystemModel) -> Result<CalEvent, CalReject> {
    let (fin, module) = model
        .pcdrm_to_pcfm(
            raw.panel as usize,
            raw.cartridge as usize,
            raw.daq as usize,
            raw.chip as usize,
            raw.module as usize,
        )
        .ok_or(CalReject::TopologyError)?;
    let peds = model
        .pedestals(
            raw.panel as usize,
            raw.cartridge as usize,
            raw.daq as usize,
            raw.chip as usize,
            raw.module as usize,
        )
        .ok_or(CalReject::TopologyError)?;

    let mut p0 = (raw.com0h as f32 - peds.com0h) as i16;
    let mut p1 = (raw.com1h as f32 - peds.com1h) as i16;
    let mut apd = 0u8;
    if p0 > p1 {
        apd = 1;
        std::mem::swap(&mut p0, &mut p1);
    }

    let a = raw.a as f32 - peds.a;
    let b = raw.b as f32 - peds.b;
    let c = raw.c as f32 - peds.c;
    let d = raw.d as f32 - peds.d;
    let spat_total = a + b + c + d;
    let x = ((c + d) - (a + b)) / spat_total;
    let mut y = ((a + d) - (b + c)) / spat_total;

    let energy = if apd == 0 {
        peds.com0 - raw.com0 as f32
    } else {
        y *= -1.0;
        peds.com1 - raw.com1 as f32
    };

    Ok(CalEvent {
        ct: raw.ct,
        ft: 0.0,
        energy,
        spatial_total: spat_total,
        x,
        y,
        panel: raw.panel,
        cartridge: raw.cartridge,
        fin: fin as u8,
        module: module as u8,
        apd,
        crystal: 0,
        daq: raw.daq,
        chip: raw.chip,
    })
}

/// Signed time difference `a - b` in nanoseconds: wraps the fine-time
/// difference into `(-uv_period_ns, uv_period_ns)`, then adds the integer
/// number of whole uv periods implied by the coarse-timestamp difference.
pub fn event_time_diff(a: &CalEvent, b: &CalEvent, uv_period_ns: f32, ct_period_ns: f32) -> f32 {
    let mut difference = a.ft - b.ft;
    while difference > uv_period_ns {
        difference -= uv_period_ns;
    }
    while difference < -uv_period_ns {
        difference += uv_period_ns;
    }
    difference += uv_period_ns * (ct_period_ns * (a.ct - b.ct) as f32 / uv_period_ns).trunc();
    difference
}

pub fn event_cal_less_than(a: &CalEvent, b: &CalEvent, uv_period_ns: f32, ct_period_ns: f32) -> bool {
    event_time_diff(a, b, uv_period_ns, ct_period_ns) < 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cal_event(ct: i64, ft: f32) -> CalEvent {
        CalEvent {
            ct,
            ft,
            energy: 511.0,
            spatial_total: 1.0,
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
    fn time_diff_of_identical_events_is_zero() {
        let e = cal_event(100, 50.0);
        assert_eq!(event_time_diff(&e, &e, 100.0, 10.0), 0.0);
    }

    #[test]
    fn time_diff_accounts_for_full_periods_between_coarse_ticks() {
        let a = cal_event(10, 5.0);
        let b = cal_event(0, 5.0);
        // 10 ticks * 10ns/tick = 100ns = exactly one uv_period_ns (100)
        let diff = event_time_diff(&a, &b, 100.0, 10.0);
        assert!((diff - 100.0).abs() < 1e-3);
    }

    #[test]
    fn less_than_matches_sign_of_time_diff() {
        let a = cal_event(0, 10.0);
        let b = cal_event(0, 20.0);
        assert!(event_cal_less_than(&a, &b, 100.0, 10.0));
        assert!(!event_cal_less_than(&b, &a, 100.0, 10.0));
    }
}
