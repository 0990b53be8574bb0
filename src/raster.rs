use nalgebra::{vector, Vector2, Vector3};

use crate::buffer::{ColorBuffer, DepthBuffer};
use crate::geometry::barycentric_pixel;
use crate::scene::Mesh;
use crate::shader::ShaderProgram;

/// Clip-space w magnitudes below this mean the vertex sits on the projection
/// plane and the perspective divide would explode.
const MIN_CLIP_W: f32 = 1e-5;

/// Maps an NDC coordinate in [-1, 1] to a raster coordinate in [0, scale - 1].
fn to_raster_coord(ndc: f32, scale: u32) -> i32 {
    return ((ndc + 1.0) * ((scale - 1) as f32) / 2.0) as i32;
}

/// Scan-converts one triangle of the mesh through the given shading program.
///
/// Runs the program's vertex stage for the three corners, performs the
/// perspective divide, and walks the screen-space bounding box; pixels whose
/// barycentric solve succeeds are depth-tested (nearest wins) and, when the
/// test passes and the fragment stage does not discard, written to the color
/// buffer. Pixels on a shared edge solve for both adjacent triangles, and the
/// depth test arbitrates.
pub fn rasterize_triangle(
    shader: &mut dyn ShaderProgram,
    mesh: &Mesh,
    face_idx: usize,
    depth_buffer: &mut DepthBuffer,
    color_buffer: &mut ColorBuffer,
) {
    let clip_positions = [
        shader.process_vertex(mesh, face_idx, 0),
        shader.process_vertex(mesh, face_idx, 1),
        shader.process_vertex(mesh, face_idx, 2),
    ];
    if clip_positions.iter().any(|p| p.w.abs() < MIN_CLIP_W) {
        return;
    }

    let width = depth_buffer.width;
    let height = depth_buffer.height;
    let mut screen_coords = [Vector2::zeros(); 3];
    let mut ndc_zs = Vector3::zeros();
    let mut one_over_ws = Vector3::zeros();
    for (i, clip) in clip_positions.iter().enumerate() {
        let ndc = clip.xyz() / clip.w;
        screen_coords[i] = vector![
            to_raster_coord(ndc.x, width),
            to_raster_coord(ndc.y, height)
        ];
        ndc_zs[i] = ndc.z;
        one_over_ws[i] = 1.0 / clip.w;
    }

    let min_x = screen_coords.iter().map(|p| p.x).min().unwrap_or(0).max(0);
    let min_y = screen_coords.iter().map(|p| p.y).min().unwrap_or(0).max(0);
    let max_x = screen_coords
        .iter()
        .map(|p| p.x)
        .max()
        .unwrap_or(-1)
        .min(width as i32 - 1);
    let max_y = screen_coords
        .iter()
        .map(|p| p.y)
        .max()
        .unwrap_or(-1)
        .min(height as i32 - 1);
    if min_x > max_x || min_y > max_y {
        // Entirely off screen.
        return;
    }

    // Depth interpolates perspective-correctly: z/w and 1/w are both affine
    // in screen space, so their barycentric combinations divide back out.
    let z_over_w = ndc_zs.component_mul(&one_over_ws);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let bary_coord = match barycentric_pixel(
                screen_coords[0],
                screen_coords[1],
                screen_coords[2],
                vector![x, y],
            ) {
                Some(weights) => weights,
                None => continue,
            };
            let interpolated_one_over_w = one_over_ws.dot(&bary_coord);
            if interpolated_one_over_w.abs() < MIN_CLIP_W {
                continue;
            }
            let depth = z_over_w.dot(&bary_coord) / interpolated_one_over_w;
            if !depth_buffer.test_and_set(x as u32, y as u32, depth) {
                continue;
            }
            if let Some(color) = shader.process_fragment(mesh, bary_coord) {
                color_buffer.set(x as u32, y as u32, color);
            }
        }
    }
}
