//! Line-oriented tuning commands read from stdin while the client runs

use anyhow::{Context, Result, anyhow, bail};

/// A request to change what the client listens to or shows
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    /// `tune L M R` selects the audio passband in FFT bins
    Tune { l: f64, m: f64, r: f64 },
    /// `mode USB`
    Demodulation(String),
    /// `mute on|off`
    Mute(bool),
    /// `squelch on|off [threshold_db]`
    Squelch { enabled: bool, threshold_db: f64 },
    /// `options {json}` is forwarded to the server untouched
    Options(serde_json::Value),
    /// `gain G` scales playback locally
    Gain(f32),
    /// `zoom in|out X` around canvas pixel X
    Zoom { x: f64, zoom_in: bool },
    /// `pan DX` drags the waterfall by DX pixels
    Pan(f64),
    /// `view L R` sets the waterfall range in FFT bins
    View { l: i64, r: i64 },
    /// `redraw` replays the retained waterfall rows
    Redraw,
    /// `range MIN MAX` sets the dB span of the colour map
    Range { min_db: f32, max_db: f32 },
    /// `alpha A` sets the spectrum smoothing factor
    Alpha(f32),
    /// `width W` resizes the canvas to W pixels
    Width(f64),
    /// `height ROWS` sets how many rows a redraw replays
    Height(usize),
}

impl Control {
    /// Commands the audio stream handles; everything else goes to the waterfall
    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            Control::Tune { .. }
                | Control::Demodulation(_)
                | Control::Mute(_)
                | Control::Squelch { .. }
                | Control::Options(_)
                | Control::Gain(_)
        )
    }
}

fn on_off(word: Option<&str>) -> Result<bool> {
    match word {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        other => Err(anyhow!("Expected on/off, got {:?}", other.unwrap_or(""))),
    }
}

fn number<T: std::str::FromStr>(word: Option<&str>, what: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    word.ok_or_else(|| anyhow!("Missing {}", what))?
        .parse()
        .with_context(|| format!("Invalid {}", what))
}

pub fn parse_control(line: &str) -> Result<Control> {
    let line = line.trim();
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let mut args = rest.split_whitespace();

    let control = match verb {
        "tune" => Control::Tune {
            l: number(args.next(), "left edge")?,
            m: number(args.next(), "centre")?,
            r: number(args.next(), "right edge")?,
        },
        "mode" => Control::Demodulation(
            args.next()
                .ok_or_else(|| anyhow!("Missing demodulation"))?
                .to_uppercase(),
        ),
        "mute" => Control::Mute(on_off(args.next())?),
        "squelch" => Control::Squelch {
            enabled: on_off(args.next())?,
            threshold_db: args.next().map_or(Ok(0.0), |t| number(Some(t), "threshold"))?,
        },
        "options" => Control::Options(
            serde_json::from_str(rest.trim()).context("Options must be a JSON value")?,
        ),
        "zoom" => {
            let zoom_in = match args.next() {
                Some("in") => true,
                Some("out") => false,
                _ => bail!("Expected zoom in|out X"),
            };
            Control::Zoom {
                x: number(args.next(), "pixel")?,
                zoom_in,
            }
        }
        "pan" => Control::Pan(number(args.next(), "offset")?),
        "view" => Control::View {
            l: number(args.next(), "left edge")?,
            r: number(args.next(), "right edge")?,
        },
        "redraw" => Control::Redraw,
        "gain" => Control::Gain(number(args.next(), "gain")?),
        "range" => Control::Range {
            min_db: number(args.next(), "minimum dB")?,
            max_db: number(args.next(), "maximum dB")?,
        },
        "alpha" => Control::Alpha(number(args.next(), "alpha")?),
        "width" => Control::Width(number(args.next(), "width")?),
        "height" => Control::Height(number(args.next(), "row count")?),
        "" => bail!("Empty command"),
        other => bail!("Unknown command '{}'", other),
    };
    Ok(control)
}
