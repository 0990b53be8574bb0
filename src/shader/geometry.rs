use nalgebra::{vector, Matrix2x3, Matrix3, Vector3, Vector4};

use crate::geometry::to_hom_point;
use crate::scene::Mesh;
use crate::shader::{ShaderProgram, Transforms};

/// Which interpolated attribute the geometry pass visualizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryOutput {
    /// World-space normals remapped into RGB.
    Normals,
    /// Texture coordinates as red/green.
    TexCoords,
    /// NDC depth as a gray value.
    Depth,
}

/// Debug program that renders one vertex attribute per pass so geometry
/// problems can be spotted before the lighting pass hides them.
pub struct GeometryShader {
    transforms: Transforms,
    output: GeometryOutput,
    normal_ws: Matrix3<f32>,
    tex_coord: Matrix2x3<f32>,
    ndc_zs: Vector3<f32>,
}

impl GeometryShader {
    pub fn new(transforms: Transforms, output: GeometryOutput) -> GeometryShader {
        return GeometryShader {
            transforms,
            output,
            normal_ws: Matrix3::zeros(),
            tex_coord: Matrix2x3::zeros(),
            ndc_zs: Vector3::zeros(),
        };
    }
}

impl ShaderProgram for GeometryShader {
    fn process_vertex(&mut self, mesh: &Mesh, face_idx: usize, vert_idx: usize) -> Vector4<f32> {
        let position_ws = self.transforms.model_matrix * to_hom_point(mesh.vert(face_idx, vert_idx));
        let position_cs =
            self.transforms.projection_matrix * self.transforms.view_matrix * position_ws;

        let normal = self.transforms.normal_matrix * mesh.normal(face_idx, vert_idx);
        self.normal_ws.set_column(vert_idx, &normal);
        self.tex_coord
            .set_column(vert_idx, &mesh.tex_coord(face_idx, vert_idx));
        if position_cs.w.abs() > f32::EPSILON {
            self.ndc_zs[vert_idx] = position_cs.z / position_cs.w;
        }

        return position_cs;
    }

    fn process_fragment(&self, _mesh: &Mesh, bary_coord: Vector3<f32>) -> Option<Vector3<f32>> {
        let color = match self.output {
            GeometryOutput::Normals => {
                let normal = (self.normal_ws * bary_coord).normalize();
                normal * 0.5 + Vector3::from_element(0.5)
            }
            GeometryOutput::TexCoords => {
                let uv = self.tex_coord * bary_coord;
                vector![uv.x, uv.y, 0.0]
            }
            GeometryOutput::Depth => {
                Vector3::from_element(self.ndc_zs.dot(&bary_coord) * 0.5 + 0.5)
            }
        };
        return Some(color);
    }
}
