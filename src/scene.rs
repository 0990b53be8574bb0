use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::{debug, info, warn};
use nalgebra as na;
use na::{vector, Matrix4, Vector2, Vector3};
use obj::{load_obj, Obj, TexturedVertex};

use crate::geometry::{make_look_at_matrix, make_model_matrix, make_perspective_matrix};

/// Texture image with nearest-neighbor sampling. Texcoords use (0, 0) as the
/// top left of the image and are clamped to the edges.
pub struct Texture {
    image: image::RgbImage,
}

impl Texture {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Texture, image::ImageError> {
        let image = image::open(path)?.to_rgb8();
        return Ok(Texture { image });
    }

    pub fn from_image(image: image::RgbImage) -> Texture {
        return Texture { image };
    }

    /// Samples the texture as a linear RGB color in [0, 1].
    pub fn sample(&self, texcoord: Vector2<f32>) -> Vector3<f32> {
        let x = (texcoord.x.clamp(0.0, 1.0) * (self.image.width() - 1) as f32) as u32;
        let y = (texcoord.y.clamp(0.0, 1.0) * (self.image.height() - 1) as f32) as u32;
        let pixel = self.image.get_pixel(x, y);
        return vector![
            pixel.0[0] as f32 / 255.0,
            pixel.0[1] as f32 / 255.0,
            pixel.0[2] as f32 / 255.0
        ];
    }

    /// Samples a single scalar in [0, 1], for maps that encode intensity in
    /// the red channel (specularity, roughness).
    pub fn sample_float(&self, texcoord: Vector2<f32>) -> f32 {
        return self.sample(texcoord).x;
    }
}

/// Shading inputs of a mesh: base colors, the PBR scalars and the optional
/// texture maps, each guarded by a capability predicate.
pub struct Material {
    pub ka: Vector3<f32>,
    pub kd: Vector3<f32>,
    pub ks: Vector3<f32>,
    pub metallic: f32,
    pub roughness: f32,
    pub diffuse_map: Option<Texture>,
    pub specular_map: Option<Texture>,
    pub normal_map: Option<Texture>,
}

impl Default for Material {
    fn default() -> Material {
        return Material {
            ka: vector![0.1, 0.1, 0.1],
            kd: vector![0.8, 0.8, 0.8],
            ks: vector![0.4, 0.4, 0.4],
            metallic: 0.1,
            roughness: 0.8,
            diffuse_map: None,
            specular_map: None,
            normal_map: None,
        };
    }
}

impl Material {
    pub fn has_diffuse_map(&self) -> bool {
        return self.diffuse_map.is_some();
    }

    pub fn has_specular_map(&self) -> bool {
        return self.specular_map.is_some();
    }

    pub fn has_normal_map(&self) -> bool {
        return self.normal_map.is_some();
    }
}

/// Point light contributing a direction and a color at a world position.
#[derive(Clone)]
pub struct PointLight {
    pub position: Vector3<f32>,
    pub color: Vector3<f32>,
    pub casts_shadow: bool,
}

/// The one active camera of a scene.
#[derive(Clone)]
pub struct Camera {
    pub eye: Vector3<f32>,
    pub center: Vector3<f32>,
    pub up: Vector3<f32>,
    pub fov: f32,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn view_matrix(&self) -> Matrix4<f32> {
        return make_look_at_matrix(self.eye, self.center, self.up);
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        return make_perspective_matrix(self.fov, self.aspect_ratio, self.near, self.far);
    }
}

/// Triangle mesh with flat per-vertex attribute arrays, a material and a
/// model placement (translation, rotation about Y, uniform scale).
pub struct Mesh {
    positions: Vec<Vector3<f32>>,
    normals: Vec<Vector3<f32>>,
    tex_coords: Vec<Vector2<f32>>,
    tangents: Option<Vec<Vector3<f32>>>,
    faces: Vec<[usize; 3]>,
    material: Material,
    pub translation: Vector3<f32>,
    pub y_rotate: f32,
    pub scale: f32,
}

impl Mesh {
    /// Builds a mesh from raw attribute arrays. Tangents are accumulated from
    /// UV-space edge deltas when the mesh carries any texcoords.
    pub fn from_parts(
        positions: Vec<Vector3<f32>>,
        normals: Vec<Vector3<f32>>,
        tex_coords: Vec<Vector2<f32>>,
        faces: Vec<[usize; 3]>,
        material: Material,
    ) -> Mesh {
        let has_uvs = tex_coords.iter().any(|uv| uv.x != 0.0 || uv.y != 0.0);
        let tangents = if has_uvs {
            Some(compute_tangents(&positions, &tex_coords, &faces))
        } else {
            None
        };
        return Mesh {
            positions,
            normals,
            tex_coords,
            tangents,
            faces,
            material,
            translation: vector![0.0, 0.0, 0.0],
            y_rotate: 0.0,
            scale: 1.0,
        };
    }

    pub fn face_count(&self) -> usize {
        return self.faces.len();
    }

    /// Object-space position of vertex vert_idx (0..2) of the given face.
    pub fn vert(&self, face_idx: usize, vert_idx: usize) -> Vector3<f32> {
        return self.positions[self.faces[face_idx][vert_idx]];
    }

    pub fn normal(&self, face_idx: usize, vert_idx: usize) -> Vector3<f32> {
        return self.normals[self.faces[face_idx][vert_idx]];
    }

    pub fn tex_coord(&self, face_idx: usize, vert_idx: usize) -> Vector2<f32> {
        return self.tex_coords[self.faces[face_idx][vert_idx]];
    }

    /// Object-space tangent; only meaningful when has_tangents() holds.
    pub fn tangent(&self, face_idx: usize, vert_idx: usize) -> Vector3<f32> {
        return match &self.tangents {
            Some(tangents) => tangents[self.faces[face_idx][vert_idx]],
            None => vector![0.0, 0.0, 0.0],
        };
    }

    pub fn has_tangents(&self) -> bool {
        return self.tangents.is_some();
    }

    pub fn material(&self) -> &Material {
        return &self.material;
    }

    pub fn model_matrix(&self) -> Matrix4<f32> {
        return make_model_matrix(self.translation, self.y_rotate, self.scale);
    }
}

/// Per-vertex tangents from the UV-space edge deltas of each face, averaged
/// over the faces sharing a vertex. Faces with a degenerate UV mapping are
/// skipped rather than poisoning their vertices.
fn compute_tangents(
    positions: &[Vector3<f32>],
    tex_coords: &[Vector2<f32>],
    faces: &[[usize; 3]],
) -> Vec<Vector3<f32>> {
    let mut tangents = vec![vector![0.0, 0.0, 0.0]; positions.len()];
    for face in faces {
        let edge_1 = positions[face[1]] - positions[face[0]];
        let edge_2 = positions[face[2]] - positions[face[0]];
        let delta_uv_1 = tex_coords[face[1]] - tex_coords[face[0]];
        let delta_uv_2 = tex_coords[face[2]] - tex_coords[face[0]];
        let det = delta_uv_1.x * delta_uv_2.y - delta_uv_2.x * delta_uv_1.y;
        if det.abs() < 1e-8 {
            continue;
        }
        let tangent = (edge_1 * delta_uv_2.y - edge_2 * delta_uv_1.y) / det;
        for &vertex_index in face {
            tangents[vertex_index] += tangent;
        }
    }
    for tangent in &mut tangents {
        if tangent.norm() > 1e-8 {
            *tangent = tangent.normalize();
        }
    }
    return tangents;
}

/// Flat scene: an ordered mesh list, the lights and one active camera.
pub struct Scene {
    pub meshes: Vec<Mesh>,
    pub lights: Vec<PointLight>,
    pub camera: Camera,
}

impl Scene {
    /// Loads a scene from an asset path prefix: "<prefix>.obj" for geometry
    /// plus optional "<prefix>_diffuse.png", "<prefix>_specular.png" and
    /// "<prefix>_normal.png" texture maps, with a default camera and one
    /// shadow-casting light.
    pub fn load(asset_path: &str, aspect_ratio: f32) -> Result<Scene, Box<dyn Error>> {
        let obj_path = format!("{}.obj", asset_path);
        let (positions, normals, tex_coords, faces) = load_obj_arrays(&obj_path)?;
        info!(
            "loaded {}: {} vertices, {} faces",
            obj_path,
            positions.len(),
            faces.len()
        );

        let mut material = Material::default();
        material.diffuse_map = open_optional_texture(&format!("{}_diffuse.png", asset_path));
        material.specular_map = open_optional_texture(&format!("{}_specular.png", asset_path));
        material.normal_map = open_optional_texture(&format!("{}_normal.png", asset_path));

        let mesh = Mesh::from_parts(positions, normals, tex_coords, faces, material);
        debug!("mesh tangents available: {}", mesh.has_tangents());

        let camera = Camera {
            eye: vector![1.0, 1.0, 3.0],
            center: vector![0.0, 0.0, 0.0],
            up: vector![0.0, 1.0, 0.0],
            fov: 45.0,
            aspect_ratio,
            near: 0.1,
            far: 50.0,
        };
        let light = PointLight {
            position: vector![2.0, 4.0, 2.0],
            color: vector![1.0, 1.0, 1.0],
            casts_shadow: true,
        };

        return Ok(Scene {
            meshes: vec![mesh],
            lights: vec![light],
            camera,
        });
    }
}

type MeshArrays = (
    Vec<Vector3<f32>>,
    Vec<Vector3<f32>>,
    Vec<Vector2<f32>>,
    Vec<[usize; 3]>,
);

/// Reads an obj file into flat attribute arrays, preferring textured vertices
/// and falling back to plain position + normal data when the file carries no
/// texcoords.
fn load_obj_arrays(obj_path: &str) -> Result<MeshArrays, Box<dyn Error>> {
    if let Ok(model) =
        load_obj::<TexturedVertex, _, u32>(BufReader::new(File::open(obj_path)?))
    {
        let positions = model
            .vertices
            .iter()
            .map(|v| vector![v.position[0], v.position[1], v.position[2]])
            .collect();
        let normals = model
            .vertices
            .iter()
            .map(|v| vector![v.normal[0], v.normal[1], v.normal[2]])
            .collect();
        // The v axis of obj texcoords points up; image rows point down.
        let tex_coords = model
            .vertices
            .iter()
            .map(|v| vector![v.texture[0], 1.0 - v.texture[1]])
            .collect();
        return Ok((positions, normals, tex_coords, collect_faces(&model.indices)));
    }

    let model: Obj<obj::Vertex, u32> = load_obj(BufReader::new(File::open(obj_path)?))?;
    warn!(
        "{} has no texture coordinates, shading with material colors only",
        obj_path
    );
    let positions: Vec<Vector3<f32>> = model
        .vertices
        .iter()
        .map(|v| vector![v.position[0], v.position[1], v.position[2]])
        .collect();
    let normals = model
        .vertices
        .iter()
        .map(|v| vector![v.normal[0], v.normal[1], v.normal[2]])
        .collect();
    let tex_coords = vec![vector![0.0, 0.0]; positions.len()];
    return Ok((positions, normals, tex_coords, collect_faces(&model.indices)));
}

fn collect_faces(indices: &[u32]) -> Vec<[usize; 3]> {
    return indices
        .chunks_exact(3)
        .map(|face| [face[0] as usize, face[1] as usize, face[2] as usize])
        .collect();
}

fn open_optional_texture(path: &str) -> Option<Texture> {
    if !Path::new(path).exists() {
        debug!("no texture at {}", path);
        return None;
    }
    return match Texture::open(path) {
        Ok(texture) => Some(texture),
        Err(error) => {
            warn!("failed to open texture {}: {}", path, error);
            None
        }
    };
}
