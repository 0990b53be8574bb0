use std::f32::consts::PI;

use nalgebra::{Vector3, Vector4};

use crate::scene::{Mesh, PointLight};
use crate::shader::{
    clamp01, fragment_normal, interpolate_lit_varyings, process_lit_vertex, shadow_visibility,
    LitVaryings, ShaderProgram, ShadowMap, Transforms, SHADOW_INTENSITY,
};

/// Cook-Torrance GGX shading program driven by the material's metallic and
/// roughness scalars. Shares the lit vertex stage and shadow handling with
/// the Blinn-Phong program.
pub struct PbrShader<'a> {
    transforms: Transforms,
    lights: &'a [PointLight],
    eye_pos: Vector3<f32>,
    shadow_maps: &'a [ShadowMap],
    perspective_correct: bool,
    varyings: LitVaryings,
}

impl<'a> PbrShader<'a> {
    pub fn new(
        transforms: Transforms,
        lights: &'a [PointLight],
        eye_pos: Vector3<f32>,
        shadow_maps: &'a [ShadowMap],
    ) -> PbrShader<'a> {
        return PbrShader {
            transforms,
            lights,
            eye_pos,
            shadow_maps,
            perspective_correct: true,
            varyings: LitVaryings::new(shadow_maps.len()),
        };
    }
}

/// Trowbridge-Reitz GGX normal distribution.
fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / (PI * denom * denom);
}

/// Smith geometry term with the direct-lighting k remapping.
fn geometry_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    let r = roughness + 1.0;
    let k = r * r / 8.0;
    let g1 = |x: f32| x / (x * (1.0 - k) + k);
    return g1(n_dot_v) * g1(n_dot_l);
}

/// Schlick's Fresnel approximation.
fn fresnel_schlick(h_dot_v: f32, f0: Vector3<f32>) -> Vector3<f32> {
    return f0 + (Vector3::from_element(1.0) - f0) * (1.0 - h_dot_v).clamp(0.0, 1.0).powi(5);
}

impl ShaderProgram for PbrShader<'_> {
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

        let albedo = if let Some(diffuse_map) = &material.diffuse_map {
            diffuse_map.sample(fragment.tex_coord)
        } else {
            material.kd
        };
        let metallic = material.metallic.clamp(0.0, 1.0);
        // Fully smooth surfaces blow up the distribution term.
        let roughness = material.roughness.clamp(0.05, 1.0);
        let f0 = Vector3::from_element(0.04).lerp(&albedo, metallic);

        let view_dir = (self.eye_pos - fragment.position_ws).normalize();
        let n_dot_v = normal.dot(&view_dir).max(0.0);

        let mut radiance = Vector3::zeros();
        for (light_index, light) in self.lights.iter().enumerate() {
            let light_dir = (light.position - fragment.position_ws).normalize();
            let n_dot_l = normal.dot(&light_dir).max(0.0);
            if n_dot_l <= 0.0 {
                continue;
            }
            let halfway_dir = (light_dir + view_dir).normalize();
            let n_dot_h = normal.dot(&halfway_dir).max(0.0);
            let h_dot_v = halfway_dir.dot(&view_dir).max(0.0);

            let d = distribution_ggx(n_dot_h, roughness);
            let g = geometry_smith(n_dot_v, n_dot_l, roughness);
            let f = fresnel_schlick(h_dot_v, f0);
            let specular = f * (d * g / (4.0 * n_dot_v * n_dot_l + 1e-4));

            // Energy not reflected specularly refracts; metals refract none.
            let diffuse_weight =
                (Vector3::from_element(1.0) - f) * (1.0 - metallic);
            let brdf = diffuse_weight.component_mul(&albedo) / PI + specular;

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

            radiance += brdf.component_mul(&light.color) * n_dot_l * visibility;
        }

        let ambient = Vector3::from_element(0.03).component_mul(&albedo);
        return Some(clamp01(ambient + radiance));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Material;
    use approx::assert_relative_eq;
    use nalgebra::{vector, Matrix4};

    fn facing_triangle(material: Material) -> Mesh {
        let positions = vec![
            vector![-1.0, -1.0, 0.0],
            vector![1.0, -1.0, 0.0],
            vector![0.0, 1.0, 0.0],
        ];
        let normals = vec![vector![0.0, 0.0, 1.0]; 3];
        let tex_coords = vec![vector![0.0, 0.0]; 3];
        return Mesh::from_parts(positions, normals, tex_coords, vec![[0, 1, 2]], material);
    }

    fn shade_centroid(mesh: &Mesh, light_position: Vector3<f32>) -> Vector3<f32> {
        let lights = [PointLight {
            position: light_position,
            color: vector![1.0, 1.0, 1.0],
            casts_shadow: false,
        }];
        let transforms =
            Transforms::new(Matrix4::identity(), Matrix4::identity(), Matrix4::identity());
        let mut shader = PbrShader::new(transforms, &lights, vector![0.0, 0.0, 5.0], &[]);
        for vert_idx in 0..3 {
            shader.process_vertex(mesh, 0, vert_idx);
        }
        return shader
            .process_fragment(mesh, vector![1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0])
            .unwrap();
    }

    #[test]
    fn light_behind_the_surface_leaves_only_ambient() {
        let mesh = facing_triangle(Material::default());
        let color = shade_centroid(&mesh, vector![0.0, 0.0, -5.0]);
        let expected_ambient = Vector3::from_element(0.03).component_mul(&Material::default().kd);
        assert_relative_eq!(color, expected_ambient, epsilon = 1e-5);
    }

    #[test]
    fn frontal_light_adds_radiance_within_unit_range() {
        let mesh = facing_triangle(Material::default());
        let color = shade_centroid(&mesh, vector![0.0, 0.0, 5.0]);
        assert!(color.x > 0.03);
        assert!(color.iter().all(|&c| (0.0..=1.0).contains(&c)));
    }

    #[test]
    fn rougher_surfaces_spread_the_highlight() {
        let mut smooth = Material::default();
        smooth.roughness = 0.1;
        let mut rough = Material::default();
        rough.roughness = 0.9;
        // Mirror-aligned light: eye and light share the surface normal axis.
        let sharp = shade_centroid(&facing_triangle(smooth), vector![0.0, 0.0, 5.0]);
        let diffuse = shade_centroid(&facing_triangle(rough), vector![0.0, 0.0, 5.0]);
        assert!(sharp.x > diffuse.x);
    }

    #[test]
    fn ggx_distribution_integrates_sanely_at_extremes() {
        // A head-on microfacet at low roughness concentrates the lobe.
        assert!(distribution_ggx(1.0, 0.1) > distribution_ggx(1.0, 0.9));
        // Grazing microfacets at low roughness are vanishingly rare.
        assert!(distribution_ggx(0.0, 0.1) < 1e-2);
    }
}
