use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pipeline::{swap_red_blue, ChannelLayout, Frame, FrameSource, Geometry};

use crate::error::VideoError;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif"];

/// Frame source over still images decoded with the `image` crate.
///
/// Every image must share the size of the first one.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    layout: ChannelLayout,
    geometry: Option<Geometry>,
    exhausted: bool,
}

impl ImageSequenceSource {
    /// Accepts a directory, a `.txt` list of image paths, or one image.
    pub fn open(path: &Path, layout: ChannelLayout) -> Result<Self, VideoError> {
        let paths = if path.is_dir() {
            scan_directory(path)?
        } else if has_extension(path, &["txt"]) {
            read_list(path)?
        } else if is_image_path(path) && path.is_file() {
            vec![path.to_path_buf()]
        } else {
            return Err(VideoError::Open {
                path: path.to_path_buf(),
                reason: "not an image, image directory, or .txt list".into(),
            });
        };
        let source = Self::from_paths(paths, layout);
        tracing::info!(
            path = %path.display(),
            images = source.len(),
            %layout,
            "opened image sequence"
        );
        Ok(source)
    }

    fn from_paths(paths: Vec<PathBuf>, layout: ChannelLayout) -> Self {
        Self {
            paths,
            layout,
            geometry: None,
            exhausted: false,
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for ImageSequenceSource {
    fn pull(&mut self, index: u64) -> Result<Option<Frame>> {
        if self.exhausted {
            return Ok(None);
        }
        let Some(path) = usize::try_from(index).ok().and_then(|i| self.paths.get(i)) else {
            self.exhausted = true;
            return Ok(None);
        };

        let image = image::open(path)
            .with_context(|| format!("failed to decode frame {index} from {}", path.display()))?;
        let rgba = image.to_rgba8();
        let actual = Geometry::new(rgba.width(), rgba.height());
        match self.geometry {
            Some(expected) if expected != actual => {
                return Err(VideoError::Geometry {
                    path: path.clone(),
                    expected,
                    actual,
                }
                .into());
            }
            Some(_) => {}
            None => self.geometry = Some(actual),
        }

        let mut data = rgba.into_raw();
        if self.layout == ChannelLayout::Bgra8 {
            swap_red_blue(&mut data);
        }
        let frame = Frame::new(index, actual.width, actual.height, self.layout, data)?;
        Ok(Some(frame))
    }
}

pub(crate) fn is_image_path(path: &Path) -> bool {
    has_extension(path, IMAGE_EXTENSIONS)
}

fn has_extension(path: &Path, wanted: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| wanted.iter().any(|w| ext.eq_ignore_ascii_case(w)))
        .unwrap_or(false)
}

fn scan_directory(dir: &Path) -> Result<Vec<PathBuf>, VideoError> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image_path(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// One path per line; blank lines and `#` comments are skipped. Relative
/// entries resolve against the list's directory.
fn read_list(list: &Path) -> Result<Vec<PathBuf>, VideoError> {
    let text = fs::read_to_string(list).map_err(|err| VideoError::Open {
        path: list.to_path_buf(),
        reason: err.to_string(),
    })?;
    let base = list.parent().unwrap_or_else(|| Path::new("."));
    Ok(parse_list(&text, base))
}

fn parse_list(text: &str, base: &Path) -> Vec<PathBuf> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let entry = Path::new(line);
            if entry.is_absolute() {
                entry.to_path_buf()
            } else {
                base.join(entry)
            }
        })
        .collect()
}
