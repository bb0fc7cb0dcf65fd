use std::borrow::Cow;

use wgpu::naga::ShaderStage;

/// Compiles the static full-screen triangle vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    compile_glsl(
        device,
        "fullscreen triangle vertex",
        VERTEX_SHADER_GLSL,
        ShaderStage::Vertex,
    )
}

/// Fragment shader that blends each new frame with the previous output.
pub(crate) fn compile_analysis_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    compile_glsl(
        device,
        "analysis fragment",
        ANALYSIS_SHADER_GLSL,
        ShaderStage::Fragment,
    )
}

/// Fragment shader that places a texture inside the window.
pub(crate) fn compile_display_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    compile_glsl(
        device,
        "display fragment",
        DISPLAY_SHADER_GLSL,
        ShaderStage::Fragment,
    )
}

fn compile_glsl(
    device: &wgpu::Device,
    label: &str,
    source: &'static str,
    stage: ShaderStage,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(source),
            stage,
            defines: &[],
        },
    })
}

/// Minimal full-screen triangle vertex shader.
///
/// `v_uv` has a bottom-left origin; fragment shaders flip it to texture space.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

/// Layout must match [`crate::gpu::uniforms::AnalysisUniforms`].
const ANALYSIS_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform AnalysisParams {
    float smoothing;
    float has_history;
    float _padding0;
    float _padding1;
} params;

layout(set = 0, binding = 1) uniform texture2D input_texture;
layout(set = 0, binding = 2) uniform texture2D history_texture;
layout(set = 0, binding = 3) uniform sampler frame_sampler;

void main() {
    vec2 uv = vec2(v_uv.x, 1.0 - v_uv.y);
    vec4 current = texture(sampler2D(input_texture, frame_sampler), uv);
    vec4 previous = texture(sampler2D(history_texture, frame_sampler), uv);
    float weight = clamp(params.smoothing * params.has_history, 0.0, 1.0);
    outColor = vec4(mix(current.rgb, previous.rgb, weight), 1.0);
}
";

/// Layout must match [`crate::gpu::uniforms::DisplayUniforms`].
const DISPLAY_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform DisplayParams {
    vec2 offset;
    vec2 scale;
    float flip;
    float _padding0;
    float _padding1;
    float _padding2;
} params;

layout(set = 0, binding = 1) uniform texture2D frame_texture;
layout(set = 0, binding = 2) uniform sampler frame_sampler;

void main() {
    vec2 window_uv = vec2(v_uv.x, 1.0 - v_uv.y);
    vec2 uv = (window_uv - params.offset) / max(params.scale, vec2(1e-6));
    if (any(lessThan(uv, vec2(0.0))) || any(greaterThan(uv, vec2(1.0)))) {
        outColor = vec4(0.0, 0.0, 0.0, 1.0);
        return;
    }
    if (params.flip > 0.5) {
        uv.y = 1.0 - uv.y;
    }
    outColor = vec4(texture(sampler2D(frame_texture, frame_sampler), uv).rgb, 1.0);
}
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_shaders_declare_their_uniform_blocks() {
        for (source, block) in [
            (ANALYSIS_SHADER_GLSL, "AnalysisParams"),
            (DISPLAY_SHADER_GLSL, "DisplayParams"),
        ] {
            assert!(source.starts_with("#version 450"));
            assert!(source.contains(block));
            assert!(source.contains("binding = 0"));
        }
    }
}
