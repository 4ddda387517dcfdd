// SPDX-License-Identifier: CEPL-1.0
//! Transform math for the per-frame uniform block.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

pub use glam;

const EYE: Vec3 = Vec3::new(2.0, 2.0, 2.0);
const FOV_Y_DEGREES: f32 = 45.0;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 10.0;

/// Layout matches `layout(set = 0, binding = 0) uniform FrameUniforms` in the vertex shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct UniformBlock {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl UniformBlock {
    /// Uniforms for a quad spinning about +Z, seen from a fixed eye point.
    pub fn spinning(elapsed_secs: f32, degrees_per_second: f32, extent: (u32, u32)) -> Self {
        Self {
            model: spin_about_z(elapsed_secs, degrees_per_second).to_cols_array_2d(),
            view: view_from_eye().to_cols_array_2d(),
            proj: vulkan_perspective(aspect_ratio(extent)).to_cols_array_2d(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

pub fn spin_about_z(elapsed_secs: f32, degrees_per_second: f32) -> Mat4 {
    Mat4::from_rotation_z((elapsed_secs * degrees_per_second).to_radians())
}

pub fn view_from_eye() -> Mat4 {
    Mat4::look_at_rh(EYE, Vec3::ZERO, Vec3::Z)
}

/// Right-handed perspective with a [0, 1] depth range and Y pointing down,
/// which is what Vulkan clip space expects.
pub fn vulkan_perspective(aspect: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR);
    proj.y_axis.y *= -1.0;
    proj
}

/// Width over height; a degenerate extent falls back to square.
pub fn aspect_ratio((width, height): (u32, u32)) -> f32 {
    if width == 0 || height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn model_starts_at_identity() {
        assert_eq!(spin_about_z(0.0, 90.0), Mat4::IDENTITY);
    }

    #[test]
    fn one_second_at_ninety_degrees_maps_x_onto_y() {
        let rotated = spin_about_z(1.0, 90.0) * Vec4::X;
        assert!((rotated - Vec4::Y).length() < 1e-5);
    }

    #[test]
    fn projection_flips_y() {
        let flipped = vulkan_perspective(1.0);
        let gl_style = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), 1.0, Z_NEAR, Z_FAR);
        assert_eq!(flipped.y_axis.y, -gl_style.y_axis.y);
        assert_eq!(flipped.x_axis, gl_style.x_axis);
    }

    #[test]
    fn zero_height_extent_is_square() {
        assert_eq!(aspect_ratio((800, 0)), 1.0);
        assert_eq!(aspect_ratio((800, 400)), 2.0);
    }

    #[test]
    fn block_is_three_column_major_matrices() {
        let block = UniformBlock::spinning(0.5, 90.0, (800, 600));
        assert_eq!(block.as_bytes().len(), 3 * 16 * std::mem::size_of::<f32>());
        assert_eq!(block.view, view_from_eye().to_cols_array_2d());
    }
}
