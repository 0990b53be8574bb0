use nalgebra::{Vector3, Vector4};

use crate::scene::{Mesh, PointLight};
use crate::shader::{
    clamp01, fragment_normal, interpolate_lit_varyings, process_lit_vertex, shadow_visibility,
    LitVaryings, ShaderProgram, ShadowMap, Transforms, SHADOW_INTENSITY,
};

/// Blinn-Phong shading program: ambient + diffuse + half-vector specular,
/// optional diffuse/specular/normal maps and shadow-map visibility.
pub struct PhongShader<'a> {
    transforms: Transforms,
    lights: &'a [PointLight],
    eye_pos: Vector3<f32>,
    shadow_maps: &'a [ShadowMap],
    perspective_correct: bool,
    varyings: LitVaryings,
}

impl<'a> PhongShader<'a> {
    pub fn new(
        transforms: Transforms,
        lights: &'a [PointLight],
        eye_pos: Vector3<f32>,
        shadow_maps: &'a [ShadowMap],
    ) -> PhongShader<'a> {
        return PhongShader {
            transforms,
            lights,
            eye_pos,
            shadow_maps,
            perspective_correct: true,
            varyings: LitVaryings::new(shadow_maps.len()),
        };
    }
}

impl ShaderProgram for PhongShader<'_> {
    fn process_vertex(&mut self, mesh: &Mesh, face_idx: usize, vert_idx: usize) -> Vector4<f32> {
        return process_lit_vertex(
            &mut self.varyings,
            &self.transforms,
            self.shadow_maps,
            self.perspective_correct,
            mesh,
            face_idx,
            vert_idx,
        );
    }

    fn process_fragment(&self, mesh: &Mesh, bary_coord: Vector3<f32>) -> Option<Vector3<f32>> {
        let material = mesh.material();
        let fragment = interpolate_lit_varyings(&self.varyings, bary_coord, self.perspective_correct);
        let normal = fragment_normal(mesh, material, &fragment);

        let base_color = if let Some(diffuse_map) = &material.diffuse_map {
            diffuse_map.sample(fragment.tex_coord)
        } else {
            material.kd
        };
        let ambient_color = if material.has_diffuse_map() {
            material.ka.component_mul(&base_color)
        } else {
            material.ka
        };

        let view_dir = (self.eye_pos - fragment.position_ws).normalize();
        let mut color = Vector3::zeros();
        for (light_index, light) in self.lights.iter().enumerate() {
            let light_dir = (light.position - fragment.position_ws).normalize();
            let halfway_dir = (light_dir + view_dir).normalize();

            let diff = light_dir.dot(&normal).max(0.0);
            let mut spec = halfway_dir.dot(&normal).max(0.0);
            spec = if let Some(specular_map) = &material.specular_map {
                // The sampled specularity acts as a shininess exponent.
                spec.powf(specular_map.sample_float(fragment.tex_coord) + 5.0)
            } else {
                spec.powf(1.0)
            };

            let ambient = ambient_color.component_mul(&light.color);
            let diffuse = (base_color * diff).component_mul(&light.color);
            let specular = (material.ks * spec).component_mul(&light.color);

            // Shadow visibility attenuates the directional terms only.
            let mut visibility = 1.0;
            if let Some((column, map)) = self
                .shadow_maps
                .iter()
                .enumerate()
                .find(|(_, map)| map.light_index == light_index)
            {
                let light_space_ndc = self.varyings.shadow_ndc[column] * bary_coord * fragment.w;
                let raw = shadow_visibility(map, light_space_ndc, normal, light_dir);
                visibility = 1.0 - (1.0 - raw) * SHADOW_INTENSITY;
            }

            color += ambient + (diffuse + specular) * visibility;
        }

        return Some(clamp01(color));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Material;
    use nalgebra::{vector, Matrix4};

    fn facing_triangle() -> Mesh {
        let positions = vec![
            vector![-1.0, -1.0, 0.0],
            vector![1.0, -1.0, 0.0],
            vector![0.0, 1.0, 0.0],
        ];
        let normals = vec![vector![0.0, 0.0, 1.0]; 3];
        let tex_coords = vec![vector![0.0, 0.0]; 3];
        return Mesh::from_parts(
            positions,
            normals,
            tex_coords,
            vec![[0, 1, 2]],
            Material::default(),
        );
    }

    fn identity_transforms() -> Transforms {
        return Transforms::new(Matrix4::identity(), Matrix4::identity(), Matrix4::identity());
    }

    fn shade_centroid(lights: &[PointLight], mesh: &Mesh) -> Vector3<f32> {
        let mut shader =
            PhongShader::new(identity_transforms(), lights, vector![0.0, 0.0, 5.0], &[]);
        for vert_idx in 0..3 {
            shader.process_vertex(mesh, 0, vert_idx);
        }
        return shader
            .process_fragment(mesh, vector![1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0])
            .expect("the phong shader never discards");
    }

    #[test]
    fn frontal_light_shades_brighter_than_a_light_behind() {
        let mesh = facing_triangle();
        let front = [PointLight {
            position: vector![0.0, 0.0, 5.0],
            color: vector![1.0, 1.0, 1.0],
            casts_shadow: false,
        }];
        let behind = [PointLight {
            position: vector![0.0, 0.0, -5.0],
            color: vector![1.0, 1.0, 1.0],
            casts_shadow: false,
        }];
        let lit = shade_centroid(&front, &mesh);
        let unlit = shade_centroid(&behind, &mesh);
        // The light behind the surface leaves only the ambient term.
        let material = Material::default();
        assert!(lit.x > unlit.x);
        assert!((unlit - material.ka).norm() < 1e-4);
    }

    #[test]
    fn output_color_is_clamped_to_unit_range() {
        let mesh = facing_triangle();
        let blinding = [PointLight {
            position: vector![0.0, 0.0, 1.0],
            color: vector![20.0, 20.0, 20.0],
            casts_shadow: false,
        }];
        let color = shade_centroid(&blinding, &mesh);
        assert!(color.iter().all(|&c| (0.0..=1.0).contains(&c)));
        assert!(color.x >= 1.0 - 1e-5);
    }

    #[test]
    fn fully_shadowed_fragment_keeps_forty_percent_of_directional_light() {
        let mesh = facing_triangle();
        let light = [PointLight {
            position: vector![0.0, 0.0, 5.0],
            color: vector![0.5, 0.5, 0.5],
            casts_shadow: true,
        }];

        // A shadow map whose stored depth is far in front of everything puts
        // every fragment in shadow.
        let mut occluded = crate::buffer::DepthBuffer::new(8, 8);
        occluded.clear(-10.0);
        let maps = [ShadowMap {
            buffer: occluded,
            light_space_matrix: Matrix4::identity(),
            light_index: 0,
        }];

        let mut shaded = PhongShader::new(
            identity_transforms(),
            &light,
            vector![0.0, 0.0, 5.0],
            &maps,
        );
        for vert_idx in 0..3 {
            shaded.process_vertex(&mesh, 0, vert_idx);
        }
        let bary = vector![1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0];
        let in_shadow = shaded.process_fragment(&mesh, bary).unwrap();
        let open = shade_centroid(&light, &mesh);

        let material = Material::default();
        let directional_open = open - material.ka.component_mul(&light[0].color);
        let directional_shadowed = in_shadow - material.ka.component_mul(&light[0].color);
        assert!(directional_shadowed.x > 0.0);
        assert!(
            (directional_shadowed.x - directional_open.x * (1.0 - SHADOW_INTENSITY)).abs() < 1e-4
        );
    }
}
