use nalgebra::{Matrix4, Vector3, Vector4};

use crate::geometry::to_hom_point;
use crate::scene::Mesh;
use crate::shader::ShaderProgram;

/// Depth-only program used to render shadow maps and depth visualizations.
/// The only varying is the NDC depth of the three vertices; the fragment
/// color is the interpolated depth remapped to a gray value.
pub struct DepthShader {
    mvp_matrix: Matrix4<f32>,
    ndc_zs: Vector3<f32>,
}

impl DepthShader {
    pub fn new(mvp_matrix: Matrix4<f32>) -> DepthShader {
        return DepthShader {
            mvp_matrix,
            ndc_zs: Vector3::zeros(),
        };
    }
}

impl ShaderProgram for DepthShader {
    fn process_vertex(&mut self, mesh: &Mesh, face_idx: usize, vert_idx: usize) -> Vector4<f32> {
        let position_cs = self.mvp_matrix * to_hom_point(mesh.vert(face_idx, vert_idx));
        if position_cs.w.abs() > f32::EPSILON {
            self.ndc_zs[vert_idx] = position_cs.z / position_cs.w;
        }
        return position_cs;
    }

    fn process_fragment(&self, _mesh: &Mesh, bary_coord: Vector3<f32>) -> Option<Vector3<f32>> {
        let ndc_z = self.ndc_zs.dot(&bary_coord);
        // [-1, 1] depth to a [0, 1] gray, near dark.
        return Some(Vector3::from_element(ndc_z * 0.5 + 0.5));
    }
}
