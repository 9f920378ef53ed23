//! Frequency scale and overlays drawn above the waterfall

use crate::waterfall::viewport::ViewportMapper;

/// Tick spacing in Hz for a visible span
///
/// The largest power of ten that still leaves more than eight spacings,
/// divided by ten, so the view holds roughly 8 to 80 ticks.
pub fn tick_spacing(span_hz: f64) -> f64 {
    let mut spacing = 1.0;
    while span_hz / spacing > 8.0 {
        spacing *= 10.0;
    }
    spacing / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    Minor,
    /// Every fifth spacing, labelled
    Labelled,
    /// Every tenth spacing, labelled and longest
    Major,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub freq: f64,
    pub x: f64,
    pub kind: TickKind,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Graduation {
    pub spacing: f64,
    pub ticks: Vec<Tick>,
}

/// Ticks for the current view, labels in MHz with only the decimals needed
pub fn graduation(mapper: &ViewportMapper) -> Graduation {
    let (freq_l, freq_r) = mapper.visible_freqs();
    let spacing = tick_spacing(freq_r - freq_l);
    let first = (freq_l / spacing).ceil() as i64;
    let last = (freq_r / spacing).floor() as i64;

    let trailing_zeros = (first..=last)
        .map(|k| k as f64 * spacing)
        .filter(|&f| f != 0.0)
        .map(trailing_zeros)
        .min()
        .unwrap_or(5)
        .min(5);
    let decimals = 6 - trailing_zeros as usize;

    let ticks = (first..=last)
        .map(|k| {
            let freq = k as f64 * spacing;
            let kind = if k % 10 == 0 {
                TickKind::Major
            } else if k % 5 == 0 {
                TickKind::Labelled
            } else {
                TickKind::Minor
            };
            let label = (kind != TickKind::Minor)
                .then(|| format!("{:.*} MHz", decimals, freq / 1_000_000.0));
            Tick {
                freq,
                x: mapper.freq_to_pixel(freq),
                kind,
                label,
            }
        })
        .collect();

    Graduation { spacing, ticks }
}

fn trailing_zeros(freq: f64) -> u32 {
    let rounded = freq.round();
    if (freq - rounded).abs() > 1e-6 || rounded == 0.0 {
        return 0;
    }
    let mut value = rounded.abs() as u64;
    let mut zeros = 0;
    while value % 10 == 0 {
        value /= 10;
        zeros += 1;
    }
    zeros
}

/// Named allocation on the frequency axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub name: &'static str,
    pub start: f64,
    pub end: f64,
}

const fn band(name: &'static str, start: f64, end: f64) -> Band {
    Band { name, start, end }
}

pub const BAND_PLAN: &[Band] = &[
    band("80M HAM", 3_500_000.0, 3_900_000.0),
    band("49M AM", 5_900_000.0, 6_200_000.0),
    band("40M HAM", 7_000_000.0, 7_200_000.0),
    band("41M AM", 7_200_000.0, 7_450_000.0),
    band("31M AM", 9_400_000.0, 9_900_000.0),
    band("30M HAM", 10_100_000.0, 10_150_000.0),
    band("25M AM", 11_600_000.0, 12_100_000.0),
    band("22M AM", 13_570_000.0, 13_870_000.0),
    band("20M HAM", 14_000_000.0, 14_350_000.0),
    band("19M AM", 15_100_000.0, 15_800_000.0),
    band("16M AM", 17_480_000.0, 17_900_000.0),
    band("17M AM", 18_068_000.0, 18_168_000.0),
    band("15M AM", 18_900_000.0, 19_020_000.0),
    band("15M HAM", 21_000_000.0, 21_450_000.0),
    band("13M AM", 21_450_000.0, 21_850_000.0),
    band("12M HAM", 24_890_000.0, 24_990_000.0),
    band("11M AM", 25_670_000.0, 26_100_000.0),
    band("CB", 26_965_000.0, 27_405_000.0),
    band("10M HAM", 28_000_000.0, 29_700_000.0),
];

#[derive(Debug, Clone, PartialEq)]
pub struct BandMarker {
    pub name: &'static str,
    pub x_start: f64,
    pub x_end: f64,
}

/// Bands overlapping the canvas, in pixel coordinates
pub fn visible_bands(mapper: &ViewportMapper) -> Vec<BandMarker> {
    BAND_PLAN
        .iter()
        .map(|band| BandMarker {
            name: band.name,
            x_start: mapper.freq_to_pixel(band.start),
            x_end: mapper.freq_to_pixel(band.end),
        })
        .filter(|m| m.x_end > 0.0 && m.x_start < mapper.canvas_width())
        .collect()
}
