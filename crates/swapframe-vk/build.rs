use std::{env, fs, path::PathBuf};

use anyhow::{Context, Result};

// Vertex layout: binding 0, location 0 = vec2 position, location 1 = vec3 color.
// Set 0 binding 0 is the per-frame uniform block { model, view, proj }.
const QUAD_VERT: &str = r#"
#version 450
layout(set = 0, binding = 0) uniform FrameUniforms {
    mat4 model;
    mat4 view;
    mat4 proj;
} ubo;

layout(location = 0) in vec2 inPosition;
layout(location = 1) in vec3 inColor;

layout(location = 0) out vec3 fragColor;

void main() {
    gl_Position = ubo.proj * ubo.view * ubo.model * vec4(inPosition, 0.0, 1.0);
    fragColor = inColor;
}
"#;

const QUAD_FRAG: &str = r#"
#version 450
layout(location = 0) in vec3 fragColor;
layout(location = 0) out vec4 outColor;

void main() {
    outColor = vec4(fragColor, 1.0);
}
"#;

fn main() -> Result<()> {
    let out = PathBuf::from(env::var("OUT_DIR").context("OUT_DIR not set")?);

    let compiler = shaderc::Compiler::new().context("shaderc compiler")?;
    let mut opts = shaderc::CompileOptions::new().context("shaderc options")?;
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    for (src, kind, name) in [
        (QUAD_VERT, shaderc::ShaderKind::Vertex, "quad.vert"),
        (QUAD_FRAG, shaderc::ShaderKind::Fragment, "quad.frag"),
    ] {
        let spv = compiler
            .compile_into_spirv(src, kind, name, "main", Some(&opts))
            .with_context(|| format!("compiling {name}"))?;
        fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8())
            .with_context(|| format!("writing {name}.spv"))?;
    }

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
