//! Solar ephemeris and macro-state transition search.
//!
//! Computes rise/transit/set times of the Sun for an arbitrary elevation
//! horizon and derives from them the current phase of the day/night cycle
//! together with the absolute time of the next phase transition. Two
//! horizons are tracked concurrently: the nautical-twilight horizon
//! (`night_horizon`, typically around -10 degrees) and the ordinary day
//! horizon (`day_horizon`, typically 0 degrees).
//!
//! The ephemeris is the standard low-accuracy solar position (good to a few
//! minutes of event time), which is plenty for twilight scheduling.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::Phase;

/// Julian date of the Unix epoch (1970-01-01 00:00 UT).
const UNIX_EPOCH_JD: f64 = 2_440_587.5;
const J2000_JD: f64 = 2_451_545.0;
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Hard cap on the transition search. A site whose horizon is ever crossed
/// crosses it within a year; exhausting the cap means the geometry admits
/// no transition at all (deep polar day/night against an unreachable
/// horizon).
const MAX_SEARCH_DAYS: u32 = 370;

/// Geographic observer location, east-positive longitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observer {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

/// Rise, transit and set of the Sun for one horizon, in Julian days.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiseSetTransit {
    pub rise: f64,
    pub transit: f64,
    pub set: f64,
}

/// Margins applied around the day-horizon crossings when classifying
/// evening and morning, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub evening_s: f64,
    pub morning_s: f64,
}

impl Default for Margins {
    fn default() -> Self {
        Self { evening_s: 7200.0, morning_s: 1800.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AstroError {
    #[error("no horizon transition found within {0} days")]
    NoTransition(u32),
}

/// Result of [`next_event`]: the phase we are in, its successor, and the
/// absolute Unix time at which the successor begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NextEvent {
    pub current: Phase,
    pub next: Phase,
    pub event_time: i64,
}

pub fn julian_from_unix(unix: f64) -> f64 {
    unix / SECONDS_PER_DAY + UNIX_EPOCH_JD
}

pub fn unix_from_julian(jd: f64) -> f64 {
    (jd - UNIX_EPOCH_JD) * SECONDS_PER_DAY
}

fn norm_deg(mut x: f64) -> f64 {
    x %= 360.0;
    if x < 0.0 {
        x += 360.0;
    }
    x
}

fn norm_unit(mut x: f64) -> f64 {
    x %= 1.0;
    if x < 0.0 {
        x += 1.0;
    }
    x
}

/// Apparent right ascension and declination of the Sun, in degrees.
fn solar_equatorial(jd: f64) -> (f64, f64) {
    let t = (jd - J2000_JD) / 36_525.0;

    // Geometric mean longitude and mean anomaly
    let l0 = 280.46646 + 36_000.76983 * t + 0.000_303_2 * t * t;
    let m = 357.52911 + 35_999.05029 * t - 0.000_153_7 * t * t;
    let mr = m.to_radians();

    // Equation of center and true longitude
    let c = (1.914_602 - 0.004_817 * t - 0.000_014 * t * t) * mr.sin()
        + (0.019_993 - 0.000_101 * t) * (2.0 * mr).sin()
        + 0.000_289 * (3.0 * mr).sin();
    let true_long = l0 + c;

    // Apparent longitude, corrected for nutation and aberration
    let omega = (125.04 - 1934.136 * t).to_radians();
    let lambda = (true_long - 0.005_69 - 0.004_78 * omega.sin()).to_radians();

    let eps = (23.439_291 - 0.013_004_2 * t + 0.002_56 * omega.cos()).to_radians();

    let ra = norm_deg((eps.cos() * lambda.sin()).atan2(lambda.cos()).to_degrees());
    let dec = (eps.sin() * lambda.sin()).asin().to_degrees();
    (ra, dec)
}

/// Greenwich mean sidereal time at 0h UT of the day containing `jd0`,
/// in degrees.
fn gmst_deg(jd0: f64) -> f64 {
    let t = (jd0 - J2000_JD) / 36_525.0;
    norm_deg(
        100.460_618_37 + 36_000.770_053_608 * t + 0.000_387_933 * t * t
            - t * t * t / 38_710_000.0,
    )
}

/// Rise, transit and set of the Sun across `horizon_deg` on the UT day
/// containing `jd`. `None` when the Sun stays on one side of the horizon
/// all day (circumpolar geometry).
pub fn solar_rst_horizon(
    jd: f64,
    observer: &Observer,
    horizon_deg: f64,
) -> Option<RiseSetTransit> {
    // 0h UT of the day in question
    let jd0 = (jd - 0.5).floor() + 0.5;

    let theta0 = gmst_deg(jd0);
    let (ra, dec) = solar_equatorial(jd0 + 0.5);

    let phi = observer.latitude_deg.to_radians();
    let delta = dec.to_radians();
    let h0 = horizon_deg.to_radians();

    let cos_h = (h0.sin() - phi.sin() * delta.sin()) / (phi.cos() * delta.cos());
    if !(-1.0..=1.0).contains(&cos_h) {
        return None;
    }
    let hour_angle_deg = cos_h.acos().to_degrees();

    // Meeus measures longitude positive west; observers here are
    // east-positive.
    let west_long = -observer.longitude_deg;
    let m_transit = norm_unit((ra + west_long - theta0) / 360.0);
    let m_rise = norm_unit(m_transit - hour_angle_deg / 360.0);
    let m_set = norm_unit(m_transit + hour_angle_deg / 360.0);

    Some(RiseSetTransit {
        rise: jd0 + m_rise,
        transit: jd0 + m_transit,
        set: jd0 + m_set,
    })
}

#[derive(Debug, Clone, Copy, Default)]
struct PartialRst {
    rise: Option<f64>,
    transit: Option<f64>,
    set: Option<f64>,
}

impl PartialRst {
    /// Record the first still-future occurrence of each moment.
    fn collect(&mut self, now_jd: f64, rst: &RiseSetTransit) {
        if self.rise.is_none() && now_jd < rst.rise {
            self.rise = Some(rst.rise);
        }
        if self.transit.is_none() && now_jd < rst.transit {
            self.transit = Some(rst.transit);
        }
        if self.set.is_none() && now_jd < rst.set {
            self.set = Some(rst.set);
        }
    }

    fn complete(&self) -> bool {
        self.rise.is_some() && self.transit.is_some() && self.set.is_some()
    }

    fn unwrap(self) -> RiseSetTransit {
        RiseSetTransit {
            rise: self.rise.unwrap_or(0.0),
            transit: self.transit.unwrap_or(0.0),
            set: self.set.unwrap_or(0.0),
        }
    }
}

/// The upcoming solar transitions relative to `jd`: the next future
/// rise/transit/set across the nautical horizon, and across the day horizon
/// on days where the Sun crosses it at all.
#[derive(Debug, Clone, Copy)]
pub struct SolarTransitions {
    pub naut: RiseSetTransit,
    pub day: Option<RiseSetTransit>,
}

/// Step forward one calendar day at a time from the day preceding `jd`,
/// keeping the first future occurrence of each moment of interest, until
/// the nautical triple is known and, when the day horizon is crossed, the
/// day triple too.
pub fn next_transitions(
    jd: f64,
    observer: &Observer,
    night_horizon: f64,
    day_horizon: f64,
) -> Result<SolarTransitions, AstroError> {
    let mut t_jd = jd - 1.0;
    let mut naut = PartialRst::default();
    let mut day = PartialRst::default();
    let mut day_crossed = false;

    for _ in 0..MAX_SEARCH_DAYS {
        let naut_today = solar_rst_horizon(t_jd, observer, night_horizon);
        if let Some(rst) = &naut_today {
            naut.collect(jd, rst);
        }
        if let Some(rst) = solar_rst_horizon(t_jd, observer, day_horizon) {
            day_crossed = true;
            day.collect(jd, &rst);
        }
        t_jd += 1.0;

        if naut_today.is_some() && naut.complete() && (!day_crossed || day.complete()) {
            return Ok(SolarTransitions {
                naut: naut.unwrap(),
                day: if day_crossed { Some(day.unwrap()) } else { None },
            });
        }
    }
    Err(AstroError::NoTransition(MAX_SEARCH_DAYS))
}

/// Classify `start_unix` into a phase of the day/night cycle and compute
/// the time of the next phase transition.
///
/// Classification priority:
/// 1. Next nautical rise no later than next nautical set: the site is in
///    full night; dawn comes at nautical rise.
/// 2. The day horizon is crossed: the margin-adjusted day-set and day-rise
///    boundaries split day, evening and morning.
/// 3. Continuous twilight (nautical crossings exist, day crossings do
///    not): only nautical transit and set distinguish dawn from dusk.
pub fn next_event(
    observer: &Observer,
    start_unix: f64,
    night_horizon: f64,
    day_horizon: f64,
    margins: Margins,
) -> Result<NextEvent, AstroError> {
    let jd = julian_from_unix(start_unix);
    let tr = next_transitions(jd, observer, night_horizon, day_horizon)?;

    let eve = margins.evening_s / SECONDS_PER_DAY;
    let mor = margins.morning_s / SECONDS_PER_DAY;

    let (current, next, ev_jd) = if tr.naut.rise <= tr.naut.set {
        (Phase::Night, Phase::Dawn, tr.naut.rise)
    } else if let Some(day) = tr.day {
        if day.set < day.rise {
            // Between today's day-rise and day-set: some flavor of daytime
            if jd > day.set - eve {
                (Phase::Evening, Phase::Dusk, day.set)
            } else if jd < day.rise + mor - 1.0 {
                (Phase::Morning, Phase::Day, day.rise + mor - 1.0)
            } else {
                (Phase::Day, Phase::Evening, day.set - eve)
            }
        } else if tr.naut.rise < day.rise {
            (Phase::Dusk, Phase::Night, tr.naut.set)
        } else {
            (Phase::Dawn, Phase::Morning, day.rise)
        }
    } else {
        // Sun never crosses the day horizon: continuous twilight
        if jd < tr.naut.transit {
            (Phase::Dawn, Phase::Dusk, tr.naut.transit)
        } else {
            (Phase::Dusk, Phase::Night, tr.naut.set)
        }
    };

    Ok(NextEvent {
        current,
        next,
        event_time: unix_from_julian(ev_jd).round() as i64,
    })
}
