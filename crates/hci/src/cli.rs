use std::path::PathBuf;

use clap::Parser;
use hciconfig::{parse_pair, Overrides};
use pipeline::ChannelLayout;
use renderer::GpuPowerPreference;

#[derive(Parser, Debug)]
#[command(
    name = "hci",
    author,
    version,
    about = "Run a movie or image sequence through the GPU face-analysis loop",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Input movie, still image, image directory, or `.txt` list of images.
    #[arg(short, long, value_name = "PATH")]
    pub input: PathBuf,

    /// Existing, writable directory for results.
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Show analysed frames in a window instead of running headless.
    #[arg(short, long)]
    pub window: bool,

    /// Record analysed frames to a movie in the output directory.
    #[arg(short, long)]
    pub movie: bool,

    /// Detector cascade calibration.
    #[arg(short, long, value_name = "VALUE")]
    pub calibration: Option<f32>,

    /// Face crop scale.
    #[arg(short, long, value_name = "FACTOR")]
    pub scale: Option<f32>,

    /// Face detector model.
    #[arg(short = 'D', long, value_name = "FILE")]
    pub detector: Option<PathBuf>,

    /// Face detector mean model.
    #[arg(short = 'M', long = "mean", value_name = "FILE")]
    pub detector_mean: Option<PathBuf>,

    /// Face landmark regressor model.
    #[arg(short = 'R', long, value_name = "FILE")]
    pub regressor: Option<PathBuf>,

    /// Eye model.
    #[arg(short = 'E', long, value_name = "FILE")]
    pub eye: Option<PathBuf>,

    /// TOML session config; command-line flags take precedence.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Temporal smoothing weight in [0, 1).
    #[arg(long, value_name = "WEIGHT")]
    pub smoothing: Option<f32>,

    /// Frame rate of the recorded movie (defaults to the input's rate).
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f64>,

    /// Display offset in normalised window units (e.g. `0.1x0`).
    #[arg(long, value_name = "XxY", value_parser = parse_f32_pair)]
    pub offset: Option<(f32, f32)>,

    /// Display scale (e.g. `0.5x0.5`).
    #[arg(long, value_name = "XxY", value_parser = parse_f32_pair)]
    pub display_scale: Option<(f32, f32)>,

    /// Mirror frames vertically in the window.
    #[arg(long)]
    pub flip: bool,

    /// Channel order used for upload: `rgba`, `bgra`, or `auto`.
    #[arg(
        long,
        value_name = "LAYOUT",
        value_parser = parse_layout,
        default_value = "auto"
    )]
    pub layout: ChannelLayout,

    /// GPU adapter preference: `high` or `low`.
    #[arg(
        long,
        value_name = "POWER",
        value_parser = parse_gpu_power,
        default_value = "high"
    )]
    pub gpu_power: GpuPowerPreference,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            offset: self.offset,
            display_scale: self.display_scale,
            flip: self.flip.then_some(true),
            smoothing: self.smoothing,
            calibration: self.calibration,
            crop_scale: self.scale,
            fps: self.fps,
            detector: self.detector.clone(),
            detector_mean: self.detector_mean.clone(),
            regressor: self.regressor.clone(),
            eye: self.eye.clone(),
        }
    }
}

pub fn parse() -> Result<Cli, clap::Error> {
    Cli::try_parse()
}

pub fn parse_f32_pair(value: &str) -> Result<(f32, f32), String> {
    let (x, y) = parse_pair::<f32>(value)?;
    if !(x.is_finite() && y.is_finite()) {
        return Err(format!("'{value}' must contain finite numbers"));
    }
    Ok((x, y))
}

pub fn parse_layout(value: &str) -> Result<ChannelLayout, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("channel layout must not be empty".to_string());
    }
    trimmed.parse()
}

pub fn parse_gpu_power(value: &str) -> Result<GpuPowerPreference, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("GPU power preference must not be empty".to_string());
    }
    trimmed.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_flags() {
        let cli = Cli::try_parse_from([
            "hci", "-i", "in.mov", "-o", "out", "-w", "-m", "-c", "0.5", "-s", "1.2", "-D",
            "d.cpb", "-M", "m.cpb", "-R", "r.cpb", "-E", "e.cpb",
        ])
        .unwrap();
        assert_eq!(cli.input, PathBuf::from("in.mov"));
        assert!(cli.window);
        assert!(cli.movie);
        assert_eq!(cli.calibration, Some(0.5));
        assert_eq!(cli.scale, Some(1.2));
        assert_eq!(cli.detector_mean, Some(PathBuf::from("m.cpb")));
        assert_eq!(cli.layout, ChannelLayout::platform());
        assert_eq!(cli.gpu_power, GpuPowerPreference::High);
    }

    #[test]
    fn overrides_only_carry_given_flags() {
        let cli = Cli::try_parse_from([
            "hci",
            "-i",
            "in",
            "-o",
            "out",
            "--offset",
            "0.25x-0.1",
            "--flip",
            "--layout",
            "rgba",
        ])
        .unwrap();
        let overrides = cli.overrides();
        assert_eq!(overrides.offset, Some((0.25, -0.1)));
        assert_eq!(overrides.flip, Some(true));
        assert_eq!(overrides.display_scale, None);
        assert_eq!(overrides.crop_scale, None);
        assert_eq!(cli.layout, ChannelLayout::Rgba8);

        let cli = Cli::try_parse_from(["hci", "-i", "in", "-o", "out"]).unwrap();
        assert_eq!(cli.overrides().flip, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse_f32_pair("wide").is_err());
        assert!(parse_f32_pair("infx1").is_err());
        assert!(parse_layout("").is_err());
        assert!(parse_layout("argb").is_err());
        assert!(parse_gpu_power("medium").is_err());
        assert_eq!(parse_gpu_power(" LOW ").unwrap(), GpuPowerPreference::Low);
        assert!(Cli::try_parse_from(["hci", "-i", "in"]).is_err());
    }
}
