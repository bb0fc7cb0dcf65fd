use std::fmt;
use std::str::FromStr;

/// Byte order of the four color channels in a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    /// Red, green, blue, alpha.
    Rgba8,
    /// Blue, green, red, alpha (the native desktop capture order).
    Bgra8,
}

impl ChannelLayout {
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Layout the texture stage should upload with on the current target.
    ///
    /// Mobile GL stacks hand us RGBA while desktop decoders prefer BGRA, so the
    /// choice is made at build time rather than per frame.
    pub fn platform() -> Self {
        if cfg!(target_os = "android") {
            ChannelLayout::Rgba8
        } else {
            ChannelLayout::Bgra8
        }
    }

    /// Byte offsets of (red, green, blue, alpha) within one pixel.
    pub fn rgba_offsets(self) -> [usize; 4] {
        match self {
            ChannelLayout::Rgba8 => [0, 1, 2, 3],
            ChannelLayout::Bgra8 => [2, 1, 0, 3],
        }
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self::platform()
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelLayout::Rgba8 => f.write_str("rgba"),
            ChannelLayout::Bgra8 => f.write_str("bgra"),
        }
    }
}

impl FromStr for ChannelLayout {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rgba" | "rgba8" => Ok(ChannelLayout::Rgba8),
            "bgra" | "bgra8" => Ok(ChannelLayout::Bgra8),
            "platform" | "auto" => Ok(ChannelLayout::platform()),
            other => Err(format!(
                "unknown channel layout '{other}'; expected rgba, bgra, or auto"
            )),
        }
    }
}

/// Width and height of every frame in a run, fixed by the first pulled frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of bytes in a tightly packed four-channel image of this size.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * ChannelLayout::BYTES_PER_PIXEL
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame {index} is {width}x{height} but carries {actual} bytes (expected {expected})")]
    SizeMismatch {
        index: u64,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("frame {index} has a zero dimension ({width}x{height})")]
    Empty { index: u64, width: u32, height: u32 },
}

/// One decoded image pulled from a frame source.
///
/// The pixel buffer is owned, so a frame stays readable after the source moves
/// on to the next pull.
#[derive(Clone)]
pub struct Frame {
    index: u64,
    geometry: Geometry,
    layout: ChannelLayout,
    data: Vec<u8>,
}

impl Frame {
    pub fn new(
        index: u64,
        width: u32,
        height: u32,
        layout: ChannelLayout,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty {
                index,
                width,
                height,
            });
        }
        let geometry = Geometry::new(width, height);
        let expected = geometry.byte_len();
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                index,
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            index,
            geometry,
            layout,
            data,
        })
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.height
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn view(&self) -> PixelView<'_> {
        PixelView {
            geometry: self.geometry,
            layout: self.layout,
            data: &self.data,
        }
    }

    /// Average of each channel in (red, green, blue, alpha) order.
    pub fn channel_means(&self) -> [f32; 4] {
        self.view().channel_means()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("geometry", &self.geometry)
            .field("layout", &self.layout)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Borrowed, tightly packed pixels handed from the analysis stage to a sink.
#[derive(Clone, Copy)]
pub struct PixelView<'a> {
    pub geometry: Geometry,
    pub layout: ChannelLayout,
    pub data: &'a [u8],
}

impl<'a> PixelView<'a> {
    pub fn new(geometry: Geometry, layout: ChannelLayout, data: &'a [u8]) -> Self {
        Self {
            geometry,
            layout,
            data,
        }
    }

    pub fn channel_means(&self) -> [f32; 4] {
        let pixels = self.data.len() / ChannelLayout::BYTES_PER_PIXEL;
        if pixels == 0 {
            return [0.0; 4];
        }
        let mut sums = [0u64; 4];
        for pixel in self.data.chunks_exact(ChannelLayout::BYTES_PER_PIXEL) {
            for (sum, byte) in sums.iter_mut().zip(pixel) {
                *sum += u64::from(*byte);
            }
        }
        let offsets = self.layout.rgba_offsets();
        let mut means = [0.0f32; 4];
        for (mean, offset) in means.iter_mut().zip(offsets) {
            *mean = sums[offset] as f32 / pixels as f32;
        }
        means
    }

    /// Copies the pixels into `dst`, reordering channels into `layout`.
    pub fn copy_as(&self, layout: ChannelLayout, dst: &mut Vec<u8>) {
        dst.clear();
        dst.extend_from_slice(self.data);
        if layout != self.layout {
            swap_red_blue(dst);
        }
    }
}

impl fmt::Debug for PixelView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelView")
            .field("geometry", &self.geometry)
            .field("layout", &self.layout)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Converts between RGBA and BGRA in place.
pub fn swap_red_blue(data: &mut [u8]) {
    for pixel in data.chunks_exact_mut(ChannelLayout::BYTES_PER_PIXEL) {
        pixel.swap(0, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_buffers_that_do_not_match_geometry() {
        let err = Frame::new(3, 2, 2, ChannelLayout::Rgba8, vec![0; 15]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::SizeMismatch {
                expected: 16,
                actual: 15,
                ..
            }
        ));
        assert!(Frame::new(0, 0, 2, ChannelLayout::Rgba8, Vec::new()).is_err());
    }

    #[test]
    fn channel_means_are_reported_in_rgba_order() {
        let bgra = vec![10, 20, 30, 255, 30, 40, 50, 255];
        let frame = Frame::new(0, 2, 1, ChannelLayout::Bgra8, bgra).unwrap();
        let means = frame.channel_means();
        assert_eq!(means, [40.0, 30.0, 20.0, 255.0]);
    }

    #[test]
    fn copy_as_swizzles_only_when_layouts_differ() {
        let frame = Frame::new(0, 1, 1, ChannelLayout::Bgra8, vec![1, 2, 3, 4]).unwrap();
        let mut out = Vec::new();
        frame.view().copy_as(ChannelLayout::Rgba8, &mut out);
        assert_eq!(out, vec![3, 2, 1, 4]);
        frame.view().copy_as(ChannelLayout::Bgra8, &mut out);
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn parses_layout_names() {
        assert_eq!("RGBA".parse::<ChannelLayout>().unwrap(), ChannelLayout::Rgba8);
        assert_eq!("bgra8".parse::<ChannelLayout>().unwrap(), ChannelLayout::Bgra8);
        assert_eq!(
            "auto".parse::<ChannelLayout>().unwrap(),
            ChannelLayout::platform()
        );
        assert!("argb".parse::<ChannelLayout>().is_err());
    }
}
