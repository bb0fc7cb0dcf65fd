use bytemuck::{Pod, Zeroable};

use crate::types::DisplayTransform;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct AnalysisUniforms {
    pub smoothing: f32,
    pub has_history: f32,
    pub _padding: [f32; 2],
}

impl AnalysisUniforms {
    pub fn new(smoothing: f32, has_history: bool) -> Self {
        Self {
            smoothing: smoothing.clamp(0.0, 1.0),
            has_history: if has_history { 1.0 } else { 0.0 },
            _padding: [0.0; 2],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct DisplayUniforms {
    pub offset: [f32; 2],
    pub scale: [f32; 2],
    pub flip: f32,
    pub _padding: [f32; 3],
}

impl From<DisplayTransform> for DisplayUniforms {
    fn from(transform: DisplayTransform) -> Self {
        Self {
            offset: transform.offset,
            scale: transform.scale,
            flip: if transform.flip_vertical { 1.0 } else { 0.0 },
            _padding: [0.0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_sizes_match_std140_blocks() {
        assert_eq!(std::mem::size_of::<AnalysisUniforms>(), 16);
        assert_eq!(std::mem::size_of::<DisplayUniforms>(), 32);
    }

    #[test]
    fn display_uniforms_carry_the_transform() {
        let uniforms = DisplayUniforms::from(DisplayTransform {
            offset: [0.1, 0.2],
            scale: [0.5, 0.75],
            flip_vertical: true,
        });
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&uniforms));
        assert_eq!(&floats[..5], &[0.1, 0.2, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn default_transform_draws_upright() {
        let uniforms = DisplayUniforms::from(DisplayTransform::default());
        assert_eq!(uniforms.flip, 0.0);
        assert_eq!(uniforms.offset, [0.0, 0.0]);
        assert_eq!(uniforms.scale, [1.0, 1.0]);
    }

    #[test]
    fn smoothing_is_clamped() {
        assert_eq!(AnalysisUniforms::new(3.0, true).smoothing, 1.0);
        assert_eq!(AnalysisUniforms::new(0.5, false).has_history, 0.0);
    }
}
