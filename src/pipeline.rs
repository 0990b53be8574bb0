use std::mem;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use log::{debug, info};
use nalgebra::{vector, Matrix4, Vector3};
use threadpool::ThreadPool;

use crate::buffer::{ColorBuffer, DepthBuffer, FAR_DEPTH};
use crate::geometry::{make_look_at_matrix, make_orthographic_matrix};
use crate::raster::rasterize_triangle;
use crate::scene::Scene;
use crate::shader::depth::DepthShader;
use crate::shader::geometry::{GeometryOutput, GeometryShader};
use crate::shader::pbr::PbrShader;
use crate::shader::phong::PhongShader;
use crate::shader::{ShadowMap, Transforms};

/// Which shading model the lighting pass runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightingModel {
    BlinnPhong,
    Pbr,
}

/// World-space extent of the orthographic shadow frustum around the scene
/// center. Assets are expected to fit a few units around the origin.
const SHADOW_EXTENT: f32 = 4.0;
const SHADOW_NEAR: f32 = 0.1;
const SHADOW_FAR: f32 = 30.0;

/// The multi-pass renderer: owns every buffer and runs the passes in order
/// over a scene. Rendering happens at ssaa_factor times the output resolution
/// in each dimension; the resolve pass averages the blocks back down.
pub struct Pipeline {
    output_width: u32,
    output_height: u32,
    ssaa_factor: u32,
    render_width: u32,
    render_height: u32,
    depth_buffer: DepthBuffer,
    color_buffer: ColorBuffer,
    gbuffer: ColorBuffer,
    shadow_maps: Vec<ShadowMap>,
    output: ColorBuffer,
    pub background: Vector3<f32>,
    pub lighting: LightingModel,
    pub geometry_output: GeometryOutput,
}

impl Pipeline {
    pub fn new(
        output_width: u32,
        output_height: u32,
        ssaa_factor: u32,
        lighting: LightingModel,
    ) -> Pipeline {
        let ssaa_factor = ssaa_factor.max(1);
        let render_width = output_width * ssaa_factor;
        let render_height = output_height * ssaa_factor;
        let background = vector![0.02, 0.02, 0.02];
        return Pipeline {
            output_width,
            output_height,
            ssaa_factor,
            render_width,
            render_height,
            depth_buffer: DepthBuffer::new(render_width, render_height),
            color_buffer: ColorBuffer::new(render_width, render_height, background),
            gbuffer: ColorBuffer::new(render_width, render_height, background),
            shadow_maps: Vec::new(),
            output: ColorBuffer::new(output_width, output_height, background),
            background,
            lighting,
            geometry_output: GeometryOutput::Normals,
        };
    }

    /// Allocates one shadow map per shadow-casting light of the scene. Must
    /// run before the passes whenever the light list changes.
    pub fn preconfigure(&mut self, scene: &Scene) {
        self.shadow_maps = scene
            .lights
            .iter()
            .enumerate()
            .filter(|(_, light)| light.casts_shadow)
            .map(|(light_index, _)| ShadowMap {
                buffer: DepthBuffer::new(self.render_width, self.render_height),
                light_space_matrix: Matrix4::identity(),
                light_index,
            })
            .collect();
        info!(
            "pipeline: {}x{} output, ssaa {}x, {} shadow map(s), {:?} lighting",
            self.output_width,
            self.output_height,
            self.ssaa_factor,
            self.shadow_maps.len(),
            self.lighting
        );
    }

    /// Renders the scene depth from each shadow-casting light's point of view
    /// into that light's shadow map, through an orthographic projection.
    pub fn do_shadow_pass(&mut self, scene: &Scene) {
        let start = Instant::now();
        let mut scratch = ColorBuffer::new(self.render_width, self.render_height, self.background);
        for map in &mut self.shadow_maps {
            let light = &scene.lights[map.light_index];
            let front = (scene.camera.center - light.position).normalize();
            // A light straight above the scene leaves the world up useless.
            let up = if front.cross(&vector![0.0, 1.0, 0.0]).norm() > 1e-4 {
                vector![0.0, 1.0, 0.0]
            } else {
                vector![1.0, 0.0, 0.0]
            };
            let view = make_look_at_matrix(light.position, scene.camera.center, up);
            let projection = make_orthographic_matrix(
                -SHADOW_EXTENT,
                SHADOW_EXTENT,
                -SHADOW_EXTENT,
                SHADOW_EXTENT,
                SHADOW_NEAR,
                SHADOW_FAR,
            );
            map.light_space_matrix = projection * view;
            map.buffer.clear(FAR_DEPTH);

            for mesh in &scene.meshes {
                let mut shader = DepthShader::new(map.light_space_matrix * mesh.model_matrix());
                for face_idx in 0..mesh.face_count() {
                    rasterize_triangle(&mut shader, mesh, face_idx, &mut map.buffer, &mut scratch);
                }
            }
        }
        info!("shadow pass took {:?}", start.elapsed());
    }

    /// Renders the selected geometry attribute into the g-buffer so mesh or
    /// transform problems can be inspected independently of the lighting.
    pub fn do_geometry_pass(&mut self, scene: &Scene) {
        let start = Instant::now();
        self.depth_buffer.clear(FAR_DEPTH);
        self.gbuffer.clear(self.background);
        for mesh in &scene.meshes {
            let transforms = Transforms::new(
                mesh.model_matrix(),
                scene.camera.view_matrix(),
                scene.camera.projection_matrix(),
            );
            let mut shader = GeometryShader::new(transforms, self.geometry_output);
            for face_idx in 0..mesh.face_count() {
                rasterize_triangle(
                    &mut shader,
                    mesh,
                    face_idx,
                    &mut self.depth_buffer,
                    &mut self.gbuffer,
                );
            }
        }
        info!(
            "geometry pass ({:?}) took {:?}",
            self.geometry_output,
            start.elapsed()
        );
    }

    /// Shades the scene with the configured lighting model, consuming the
    /// shadow maps rendered by the shadow pass.
    pub fn do_lighting_pass(&mut self, scene: &Scene) {
        let start = Instant::now();
        self.depth_buffer.clear(FAR_DEPTH);
        self.color_buffer.clear(self.background);
        for mesh in &scene.meshes {
            let transforms = Transforms::new(
                mesh.model_matrix(),
                scene.camera.view_matrix(),
                scene.camera.projection_matrix(),
            );
            match self.lighting {
                LightingModel::BlinnPhong => {
                    let mut shader = PhongShader::new(
                        transforms,
                        &scene.lights,
                        scene.camera.eye,
                        &self.shadow_maps,
                    );
                    for face_idx in 0..mesh.face_count() {
                        rasterize_triangle(
                            &mut shader,
                            mesh,
                            face_idx,
                            &mut self.depth_buffer,
                            &mut self.color_buffer,
                        );
                    }
                }
                LightingModel::Pbr => {
                    let mut shader = PbrShader::new(
                        transforms,
                        &scene.lights,
                        scene.camera.eye,
                        &self.shadow_maps,
                    );
                    for face_idx in 0..mesh.face_count() {
                        rasterize_triangle(
                            &mut shader,
                            mesh,
                            face_idx,
                            &mut self.depth_buffer,
                            &mut self.color_buffer,
                        );
                    }
                }
            }
        }
        info!("lighting pass took {:?}", start.elapsed());
    }

    /// Resolves the supersampled color buffer into the output buffer by
    /// averaging each ssaa_factor x ssaa_factor block, one worker per row.
    pub fn do_ssaa(&mut self) {
        let start = Instant::now();
        if self.ssaa_factor <= 1 {
            self.output = self.color_buffer.clone();
            debug!("ssaa resolve skipped at factor 1");
            return;
        }

        let factor = self.ssaa_factor;
        let samples_per_pixel = (factor * factor) as f32;
        let placeholder = ColorBuffer::new(1, 1, self.background);
        let high_res = Arc::new(mem::replace(&mut self.color_buffer, placeholder));

        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let pool = ThreadPool::new(workers);
        let (tx, rx) = mpsc::channel();
        for y in 0..self.output_height {
            let tx = tx.clone();
            let high_res = Arc::clone(&high_res);
            let width = self.output_width;
            pool.execute(move || {
                let mut row = Vec::with_capacity(width as usize);
                for x in 0..width {
                    let mut sum = Vector3::zeros();
                    for dy in 0..factor {
                        for dx in 0..factor {
                            sum += high_res.get(x * factor + dx, y * factor + dy);
                        }
                    }
                    row.push(sum / samples_per_pixel);
                }
                // Failure means the receiver is gone and the resolve with it.
                tx.send((y, row)).unwrap();
            });
        }
        drop(tx);
        for (y, row) in rx {
            for (x, color) in row.into_iter().enumerate() {
                self.output.set(x as u32, y, color);
            }
        }
        pool.join();

        self.color_buffer = Arc::try_unwrap(high_res).unwrap_or_else(|arc| (*arc).clone());
        info!(
            "ssaa resolve ({}x, {} workers) took {:?}",
            factor,
            workers,
            start.elapsed()
        );
    }

    /// The resolved output-resolution image.
    pub fn output(&self) -> &ColorBuffer {
        return &self.output;
    }

    /// The geometry pass target, at render resolution.
    pub fn gbuffer(&self) -> &ColorBuffer {
        return &self.gbuffer;
    }

    pub fn shadow_maps(&self) -> &[ShadowMap] {
        return &self.shadow_maps;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Camera, Material, Mesh, PointLight};
    use approx::assert_relative_eq;

    fn single_triangle_scene() -> Scene {
        let positions = vec![
            vector![-1.0, -1.0, 0.0],
            vector![1.0, -1.0, 0.0],
            vector![0.0, 1.0, 0.0],
        ];
        let normals = vec![vector![0.0, 0.0, 1.0]; 3];
        let tex_coords = vec![vector![0.0, 0.0]; 3];
        let mesh = Mesh::from_parts(
            positions,
            normals,
            tex_coords,
            vec![[0, 1, 2]],
            Material::default(),
        );
        return Scene {
            meshes: vec![mesh],
            lights: vec![PointLight {
                position: vector![0.0, 2.0, 3.0],
                color: vector![1.0, 1.0, 1.0],
                casts_shadow: true,
            }],
            camera: Camera {
                eye: vector![0.0, 0.0, 3.0],
                center: vector![0.0, 0.0, 0.0],
                up: vector![0.0, 1.0, 0.0],
                fov: 45.0,
                aspect_ratio: 1.0,
                near: 0.1,
                far: 50.0,
            },
        };
    }

    #[test]
    fn ssaa_resolve_averages_each_block() {
        let mut pipeline = Pipeline::new(1, 1, 2, LightingModel::BlinnPhong);
        pipeline.color_buffer.set(0, 0, vector![1.0, 0.0, 0.0]);
        pipeline.color_buffer.set(1, 0, vector![1.0, 0.0, 0.0]);
        pipeline.color_buffer.set(0, 1, vector![0.0, 0.0, 1.0]);
        pipeline.color_buffer.set(1, 1, vector![0.0, 0.0, 1.0]);
        pipeline.do_ssaa();
        assert_relative_eq!(
            pipeline.output().get(0, 0),
            vector![0.5, 0.0, 0.5],
            epsilon = 1e-6
        );
    }

    #[test]
    fn ssaa_factor_one_copies_the_color_buffer() {
        let mut pipeline = Pipeline::new(2, 2, 1, LightingModel::BlinnPhong);
        pipeline.color_buffer.set(1, 0, vector![0.0, 1.0, 0.0]);
        pipeline.do_ssaa();
        assert_relative_eq!(pipeline.output().get(1, 0), vector![0.0, 1.0, 0.0]);
    }

    #[test]
    fn full_pass_sequence_renders_the_triangle() {
        let scene = single_triangle_scene();
        let mut pipeline = Pipeline::new(32, 32, 1, LightingModel::BlinnPhong);
        pipeline.preconfigure(&scene);
        pipeline.do_shadow_pass(&scene);
        pipeline.do_geometry_pass(&scene);
        pipeline.do_lighting_pass(&scene);
        pipeline.do_ssaa();

        // The shadow pass saw the triangle from the light.
        assert_eq!(pipeline.shadow_maps().len(), 1);
        let map = &pipeline.shadow_maps()[0];
        let mut shadow_entries = 0;
        for y in 0..map.buffer.height {
            for x in 0..map.buffer.width {
                if map.buffer.get(x, y) < FAR_DEPTH {
                    shadow_entries += 1;
                }
            }
        }
        assert!(shadow_entries > 0);

        // Both the g-buffer and the lit output show the triangle.
        let background = pipeline.background;
        let gbuffer_hits = (0..32)
            .flat_map(|y| (0..32).map(move |x| (x, y)))
            .filter(|&(x, y)| pipeline.gbuffer().get(x, y) != background)
            .count();
        let lit_hits = (0..32)
            .flat_map(|y| (0..32).map(move |x| (x, y)))
            .filter(|&(x, y)| pipeline.output().get(x, y) != background)
            .count();
        assert!(gbuffer_hits > 0);
        assert!(lit_hits > 0);
    }

    #[test]
    fn pbr_lighting_pass_renders_the_triangle_too() {
        let scene = single_triangle_scene();
        let mut pipeline = Pipeline::new(16, 16, 1, LightingModel::Pbr);
        pipeline.preconfigure(&scene);
        pipeline.do_shadow_pass(&scene);
        pipeline.do_lighting_pass(&scene);
        pipeline.do_ssaa();
        let background = pipeline.background;
        let lit_hits = (0..16)
            .flat_map(|y| (0..16).map(move |x| (x, y)))
            .filter(|&(x, y)| pipeline.output().get(x, y) != background)
            .count();
        assert!(lit_hits > 0);
    }
}
