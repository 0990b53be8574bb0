pub mod depth;
pub mod geometry;
pub mod pbr;
pub mod phong;

use nalgebra as na;
use na::{vector, Matrix2x3, Matrix3, Matrix4, Vector2, Vector3, Vector4};

use crate::buffer::DepthBuffer;
use crate::geometry::{from_hom_point, make_normal_matrix, to_hom_point};
use crate::scene::{Material, Mesh};

/// The contract every shading program implements. The rasterizer holds the
/// current program behind this trait and drives it one triangle at a time:
/// three process_vertex calls followed by one process_fragment call per
/// covered pixel.
pub trait ShaderProgram {
    /// Transforms vertex vert_idx (0..2) of the given face into clip space,
    /// stashing whatever per-vertex attributes the fragment stage will need
    /// into the program's varying store at column vert_idx. Returns the
    /// un-divided clip-space position; the rasterizer performs the
    /// perspective divide.
    fn process_vertex(&mut self, mesh: &Mesh, face_idx: usize, vert_idx: usize) -> Vector4<f32>;

    /// Shades one fragment from the barycentric weight of the current pixel
    /// within the current triangle. None discards the fragment (no color
    /// write; the depth write already happened).
    fn process_fragment(&self, mesh: &Mesh, bary_coord: Vector3<f32>) -> Option<Vector3<f32>>;
}

/// Per-pass transform uniforms shared by the shader programs.
#[derive(Clone, Copy)]
pub struct Transforms {
    pub model_matrix: Matrix4<f32>,
    pub view_matrix: Matrix4<f32>,
    pub projection_matrix: Matrix4<f32>,
    pub normal_matrix: Matrix3<f32>,
}

impl Transforms {
    pub fn new(
        model_matrix: Matrix4<f32>,
        view_matrix: Matrix4<f32>,
        projection_matrix: Matrix4<f32>,
    ) -> Transforms {
        return Transforms {
            model_matrix,
            view_matrix,
            projection_matrix,
            normal_matrix: make_normal_matrix(&model_matrix),
        };
    }
}

/// Depth rendered from one light's point of view, together with the transform
/// that produced it and the index of that light in the scene light list.
pub struct ShadowMap {
    pub buffer: DepthBuffer,
    pub light_space_matrix: Matrix4<f32>,
    pub light_index: usize,
}

/// How much a fully shadowed fragment dims its diffuse and specular terms.
pub const SHADOW_INTENSITY: f32 = 0.6;

/// 3x3 percentage-closer shadow lookup. Takes the fragment position in the
/// light's NDC space and returns the fraction of neighboring shadow-map
/// samples the fragment is in front of, with a slope-scaled depth bias
/// against self-shadow acne. Fragments outside the map count as lit.
pub fn shadow_visibility(
    map: &ShadowMap,
    light_space_ndc: Vector3<f32>,
    normal: Vector3<f32>,
    light_dir: Vector3<f32>,
) -> f32 {
    let width = map.buffer.width as i32;
    let height = map.buffer.height as i32;
    let center_x = ((light_space_ndc.x + 1.0) * ((width - 1) as f32) / 2.0).round() as i32;
    let center_y = ((light_space_ndc.y + 1.0) * ((height - 1) as f32) / 2.0).round() as i32;
    let bias = (0.05 * (1.0 - normal.dot(&light_dir))).max(0.005);

    let mut lit = 0.0;
    let mut samples = 0.0;
    for dy in -1..=1 {
        for dx in -1..=1 {
            let x = center_x + dx;
            let y = center_y + dy;
            if x < 0 || y < 0 || x >= width || y >= height {
                continue;
            }
            samples += 1.0;
            if light_space_ndc.z - bias <= map.buffer.get(x as u32, y as u32) {
                lit += 1.0;
            }
        }
    }
    if samples == 0.0 {
        return 1.0;
    }
    return lit / samples;
}

/// The varying store the lit programs (Blinn-Phong, PBR) share: one column
/// per vertex, fully overwritten for vertices 0..2 of a triangle before any
/// fragment of that triangle reads it.
pub struct LitVaryings {
    pub position_ws: Matrix3<f32>,
    pub tex_coord: Matrix2x3<f32>,
    pub normal_ws: Matrix3<f32>,
    pub tangent_ws: Matrix3<f32>,
    /// Light-space NDC positions, one matrix per shadow map.
    pub shadow_ndc: Vec<Matrix3<f32>>,
    /// 1/w of the three clip-space positions, for undoing the perspective
    /// correction in the fragment stage.
    pub one_over_w: Vector3<f32>,
}

impl LitVaryings {
    pub fn new(shadow_map_count: usize) -> LitVaryings {
        return LitVaryings {
            position_ws: Matrix3::zeros(),
            tex_coord: Matrix2x3::zeros(),
            normal_ws: Matrix3::zeros(),
            tangent_ws: Matrix3::zeros(),
            shadow_ndc: vec![Matrix3::zeros(); shadow_map_count],
            one_over_w: vector![1.0, 1.0, 1.0],
        };
    }
}

/// Interpolated lit varyings at one fragment, after perspective correction
/// has been undone. The w factor is kept so lazily interpolated varyings
/// (the shadow columns) can be corrected the same way.
pub struct LitFragment {
    pub position_ws: Vector3<f32>,
    pub tex_coord: Vector2<f32>,
    pub normal_ws: Vector3<f32>,
    pub tangent_ws: Vector3<f32>,
    pub w: f32,
}

/// Shared vertex stage of the lit programs: model/view/projection transform
/// plus varying capture, with optional 1/w premultiplication for
/// perspective-correct interpolation.
pub(crate) fn process_lit_vertex(
    varyings: &mut LitVaryings,
    transforms: &Transforms,
    shadow_maps: &[ShadowMap],
    perspective_correct: bool,
    mesh: &Mesh,
    face_idx: usize,
    vert_idx: usize,
) -> Vector4<f32> {
    let position_ws = transforms.model_matrix * to_hom_point(mesh.vert(face_idx, vert_idx));
    let position_vs = transforms.view_matrix * position_ws;
    let position_cs = transforms.projection_matrix * position_vs;

    let mut position = position_ws.xyz();
    let mut tex_coord = mesh.tex_coord(face_idx, vert_idx);
    let mut normal = transforms.normal_matrix * mesh.normal(face_idx, vert_idx);
    let mut tangent = if mesh.has_tangents() {
        transforms.normal_matrix * mesh.tangent(face_idx, vert_idx)
    } else {
        vector![0.0, 0.0, 0.0]
    };
    let mut shadow_positions: Vec<Vector3<f32>> = shadow_maps
        .iter()
        .map(|map| from_hom_point(map.light_space_matrix * position_ws))
        .collect();

    if perspective_correct {
        let one_over_w = 1.0 / position_cs.w;
        varyings.one_over_w[vert_idx] = one_over_w;
        position *= one_over_w;
        tex_coord *= one_over_w;
        normal *= one_over_w;
        tangent *= one_over_w;
        for shadow_position in &mut shadow_positions {
            *shadow_position *= one_over_w;
        }
    } else {
        varyings.one_over_w[vert_idx] = 1.0;
    }

    varyings.position_ws.set_column(vert_idx, &position);
    varyings.tex_coord.set_column(vert_idx, &tex_coord);
    varyings.normal_ws.set_column(vert_idx, &normal);
    varyings.tangent_ws.set_column(vert_idx, &tangent);
    for (column, shadow_position) in shadow_positions.iter().enumerate() {
        varyings.shadow_ndc[column].set_column(vert_idx, shadow_position);
    }

    return position_cs;
}

/// Interpolates the lit varyings at one fragment as varying-matrix times
/// barycentric weight, reconstructing w from the interpolated 1/w.
pub(crate) fn interpolate_lit_varyings(
    varyings: &LitVaryings,
    bary_coord: Vector3<f32>,
    perspective_correct: bool,
) -> LitFragment {
    let w = if perspective_correct {
        1.0 / varyings.one_over_w.dot(&bary_coord)
    } else {
        1.0
    };
    return LitFragment {
        position_ws: varyings.position_ws * bary_coord * w,
        tex_coord: varyings.tex_coord * bary_coord * w,
        normal_ws: varyings.normal_ws * bary_coord * w,
        tangent_ws: varyings.tangent_ws * bary_coord * w,
        w,
    };
}

/// Per-fragment shading normal: the interpolated normal, or, when the
/// material carries a normal map and the mesh carries tangents, a sampled
/// tangent-space normal brought to world space through a TBN basis
/// (Gram-Schmidt re-orthogonalized tangent, cross-product bitangent).
pub(crate) fn fragment_normal(mesh: &Mesh, material: &Material, fragment: &LitFragment) -> Vector3<f32> {
    let n = fragment.normal_ws.normalize();
    if !mesh.has_tangents() || !material.has_normal_map() {
        return n;
    }
    let normal_map = match &material.normal_map {
        Some(map) => map,
        None => return n,
    };
    // The small offset keeps a zero interpolated tangent from breaking the
    // normalization.
    let raw_tangent = (fragment.tangent_ws + Vector3::from_element(0.001)).normalize();
    let t = (raw_tangent - n * raw_tangent.dot(&n)).normalize();
    let b = n.cross(&t).normalize();
    let tbn_matrix = Matrix3::from_columns(&[t, b, n]);
    let sampled = normal_map.sample(fragment.tex_coord);
    // Remap from color range [0, 1] to direction range [-1, 1].
    let tangent_space_normal = (sampled * 2.0 - Vector3::from_element(1.0)).normalize();
    return (tbn_matrix * tangent_space_normal).normalize();
}

/// Component-wise clamp to [0, 1].
pub fn clamp01(color: Vector3<f32>) -> Vector3<f32> {
    return color.map(|component| component.clamp(0.0, 1.0));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::DepthBuffer;
    use approx::assert_relative_eq;
    use nalgebra::Matrix4;

    fn head_on_shadow_map(stored_depth: f32) -> ShadowMap {
        let mut buffer = DepthBuffer::new(8, 8);
        buffer.clear(stored_depth);
        return ShadowMap {
            buffer,
            light_space_matrix: Matrix4::identity(),
            light_index: 0,
        };
    }

    #[test]
    fn fragment_in_front_of_stored_depth_is_fully_lit() {
        let map = head_on_shadow_map(0.0);
        let visibility = shadow_visibility(
            &map,
            vector![0.0, 0.0, -0.5],
            vector![0.0, 0.0, 1.0],
            vector![0.0, 0.0, 1.0],
        );
        assert_relative_eq!(visibility, 1.0);
    }

    #[test]
    fn fragment_behind_stored_depth_is_in_shadow() {
        let map = head_on_shadow_map(0.0);
        let visibility = shadow_visibility(
            &map,
            vector![0.0, 0.0, 0.5],
            vector![0.0, 0.0, 1.0],
            vector![0.0, 0.0, 1.0],
        );
        assert_relative_eq!(visibility, 0.0);
    }

    #[test]
    fn bias_keeps_a_surface_from_shadowing_itself() {
        // Stored depth equals the fragment depth, as happens for the surface
        // that produced the shadow map in the first place.
        let map = head_on_shadow_map(0.25);
        let visibility = shadow_visibility(
            &map,
            vector![0.0, 0.0, 0.25],
            vector![0.0, 0.0, 1.0],
            vector![0.0, 0.0, 1.0],
        );
        assert_relative_eq!(visibility, 1.0);
    }

    #[test]
    fn fragments_outside_the_map_count_as_lit() {
        let map = head_on_shadow_map(0.0);
        let visibility = shadow_visibility(
            &map,
            vector![5.0, 5.0, 0.5],
            vector![0.0, 0.0, 1.0],
            vector![0.0, 0.0, 1.0],
        );
        assert_relative_eq!(visibility, 1.0);
    }

    #[test]
    fn clamp01_bounds_every_component() {
        let clamped = clamp01(vector![1.5, -0.5, 0.25]);
        assert_relative_eq!(clamped, vector![1.0, 0.0, 0.25]);
    }
}
