use nalgebra as na;
use na::{matrix, vector, Matrix3, Matrix4, Vector2, Vector3, Vector4};

/// How small the normalizing component of the barycentric solve can get before
/// the triangle is treated as degenerate.
pub const DEGENERACY_THRESHOLD: f64 = 1e-2;

/// Transformation of a point to homogenous coordinates.
pub fn to_hom_point(v: Vector3<f32>) -> Vector4<f32> {
    return vector![v.x, v.y, v.z, 1.0];
}

/// Transformation of a vector to homogenous coordinates.
pub fn to_hom_vector(v: Vector3<f32>) -> Vector4<f32> {
    return vector![v.x, v.y, v.z, 0.0];
}

/// Transformation of a point from homogenous coordinates.
pub fn from_hom_point(v: Vector4<f32>) -> Vector3<f32> {
    return vector![v.x / v.w, v.y / v.w, v.z / v.w];
}

/// Checks that p lies on the same side of all three edges of the triangle abc,
/// which holds regardless of the winding order. Points exactly on an edge count
/// as inside.
pub fn inside_triangle(
    a: Vector2<f32>,
    b: Vector2<f32>,
    c: Vector2<f32>,
    p: Vector2<f32>,
) -> bool {
    let e0 = (a - c).perp(&(p - c));
    let e1 = (b - a).perp(&(p - a));
    let e2 = (c - b).perp(&(p - b));
    return (e0 >= 0.0 && e1 >= 0.0 && e2 >= 0.0) || (e0 <= 0.0 && e1 <= 0.0 && e2 <= 0.0);
}

/// Signed area of the triangle abc; the sign encodes the winding order.
pub fn triangle_area(a: Vector2<f32>, b: Vector2<f32>, c: Vector2<f32>) -> f32 {
    return 0.5 * ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y));
}

/// Barycentric coordinates of p relative to the triangle abc, solved via the
/// cross product of the two edge/offset stacks. Returns None when the triangle
/// is near-degenerate (normalizing component magnitude at most 1e-2) or when p
/// lies outside (any weight negative), so a Some result is always a valid
/// convex weight triple summing to 1.
pub fn barycentric(
    a: Vector2<f32>,
    b: Vector2<f32>,
    c: Vector2<f32>,
    p: Vector2<f32>,
) -> Option<Vector3<f32>> {
    // The solve runs in f64 so thin screen-space triangles do not lose the
    // normalizing component to rounding.
    let s0 = Vector3::new(
        (b.x - a.x) as f64,
        (c.x - a.x) as f64,
        (a.x - p.x) as f64,
    );
    let s1 = Vector3::new(
        (b.y - a.y) as f64,
        (c.y - a.y) as f64,
        (a.y - p.y) as f64,
    );
    let raw = s0.cross(&s1);
    if raw.z.abs() <= DEGENERACY_THRESHOLD {
        // Cannot form a triangle.
        return None;
    }
    let u = raw.x / raw.z;
    let v = raw.y / raw.z;
    let weights = vector![(1.0 - (u + v)) as f32, u as f32, v as f32];
    if weights.x < 0.0 || weights.y < 0.0 || weights.z < 0.0 {
        return None;
    }
    return Some(weights);
}

/// Integer-pixel entry point of the barycentric solver, used by the
/// screen-space rasterizer.
pub fn barycentric_pixel(
    a: Vector2<i32>,
    b: Vector2<i32>,
    c: Vector2<i32>,
    p: Vector2<i32>,
) -> Option<Vector3<f32>> {
    return barycentric(
        vector![a.x as f32, a.y as f32],
        vector![b.x as f32, b.y as f32],
        vector![c.x as f32, c.y as f32],
        vector![p.x as f32, p.y as f32],
    );
}

/// Composes translation x Y-axis rotation x uniform scale, in that application
/// order.
pub fn make_model_matrix(translation: Vector3<f32>, y_rotate_degrees: f32, scale: f32) -> Matrix4<f32> {
    assert!(scale != 0.0, "model matrix with zero scale is not invertible");
    let rad = y_rotate_degrees.to_radians();
    let (sin, cos) = rad.sin_cos();
    let s = matrix![scale, 0.0,   0.0,   0.0;
                    0.0,   scale, 0.0,   0.0;
                    0.0,   0.0,   scale, 0.0;
                    0.0,   0.0,   0.0,   1.0];
    let r = matrix![cos,  0.0, sin, 0.0;
                    0.0,  1.0, 0.0, 0.0;
                    -sin, 0.0, cos, 0.0;
                    0.0,  0.0, 0.0, 1.0];
    let t = matrix![1.0, 0.0, 0.0, translation.x;
                    0.0, 1.0, 0.0, translation.y;
                    0.0, 0.0, 1.0, translation.z;
                    0.0, 0.0, 0.0, 1.0];
    return t * r * s;
}

/// Right-handed view matrix looking from eye towards center.
/// Degenerate configurations (eye on top of center, forward parallel to the
/// world up) are caller bugs and fail the contract checks.
pub fn make_look_at_matrix(
    eye: Vector3<f32>,
    center: Vector3<f32>,
    world_up: Vector3<f32>,
) -> Matrix4<f32> {
    assert!(eye != center, "look-at eye and center coincide");
    let front = (center - eye).normalize();
    assert!(
        front.cross(&world_up).norm() > 1e-6,
        "look-at forward direction is parallel to the world up vector"
    );
    let right = front.cross(&world_up).normalize();
    let up = right.cross(&front).normalize();
    let r = matrix![right.x,  right.y,  right.z,  0.0;
                    up.x,     up.y,     up.z,     0.0;
                    -front.x, -front.y, -front.z, 0.0;
                    0.0,      0.0,      0.0,      1.0];
    let t = matrix![1.0, 0.0, 0.0, -eye.x;
                    0.0, 1.0, 0.0, -eye.y;
                    0.0, 0.0, 1.0, -eye.z;
                    0.0, 0.0, 0.0, 1.0];
    return r * t;
}

/// Symmetric perspective projection from a vertical field of view (degrees)
/// and an aspect ratio, mapping view space to clip space with w = -z.
/// A point at depth n lands on NDC z = -1 and one at depth f on z = 1.
pub fn make_perspective_matrix(fov: f32, aspect_ratio: f32, n: f32, f: f32) -> Matrix4<f32> {
    let tan_fov_over_2 = (fov / 2.0).to_radians().tan();
    return matrix![
        1.0 / (aspect_ratio * tan_fov_over_2), 0.0, 0.0, 0.0;
        0.0, 1.0 / tan_fov_over_2, 0.0, 0.0;
        0.0, 0.0, -(f + n) / (f - n), -2.0 * f * n / (f - n);
        0.0, 0.0, -1.0, 0.0];
}

/// Perspective projection of an explicit, possibly asymmetric frustum.
pub fn make_frustum_matrix(l: f32, r: f32, b: f32, t: f32, n: f32, f: f32) -> Matrix4<f32> {
    return matrix![
        2.0 * n / (r - l), 0.0, (r + l) / (r - l), 0.0;
        0.0, 2.0 * n / (t - b), (t + b) / (t - b), 0.0;
        0.0, 0.0, -(f + n) / (f - n), -2.0 * f * n / (f - n);
        0.0, 0.0, -1.0, 0.0];
}

/// Maps an axis-aligned box to the NDC cube.
pub fn make_orthographic_matrix(l: f32, r: f32, b: f32, t: f32, n: f32, f: f32) -> Matrix4<f32> {
    return matrix![
        2.0 / (r - l), 0.0, 0.0, -(r + l) / (r - l);
        0.0, 2.0 / (t - b), 0.0, -(t + b) / (t - b);
        0.0, 0.0, -2.0 / (f - n), -(f + n) / (f - n);
        0.0, 0.0, 0.0, 1.0];
}

/// Inverse-transpose of the model matrix's upper 3x3, which keeps normals
/// perpendicular to surfaces under non-uniform scale.
pub fn make_normal_matrix(model_matrix: &Matrix4<f32>) -> Matrix3<f32> {
    let inverse = match model_matrix.try_inverse() {
        Some(m) => m,
        None => {
            log::warn!("normal matrix requested for a singular model matrix, falling back to identity");
            Matrix4::identity()
        }
    };
    let it = inverse.transpose();
    return matrix![it.m11, it.m12, it.m13;
                   it.m21, it.m22, it.m23;
                   it.m31, it.m32, it.m33];
}
