//! Posed collision bodies used for point inclusion and ray tests.
//!
//! A [`Body`] is built once from a [`Shape`] description and then moved
//! around with [`Body::set_pose`].  Scale and padding inflate the solid:
//! every characteristic length `l` becomes `l * scale + padding` (radii,
//! half extents, half lengths; mesh vertices move away from the mesh
//! centroid).
//!
//! | Shape | Local frame |
//! |------|------|
//! | [`Shape::Sphere`]   | centered at the origin |
//! | [`Shape::Box`]      | centered at the origin, edges along the axes |
//! | [`Shape::Cylinder`] | centered at the origin, axis along +Z |
//! | [`Shape::Mesh`]     | vertices as given; must describe a convex solid |
//!
//! # Example
//!
//! ```rust
//! use selfmask_geometry::bodies::{Body, Shape};
//! use selfmask_geometry::transform::{Transform3D, Vec3};
//!
//! let mut body = Body::from_shape(&Shape::Sphere { radius: 0.5 }).unwrap();
//! body.set_pose(Transform3D::from_translation(Vec3::new(0.0, 0.0, 1.0)));
//!
//! assert!(body.contains_point(Vec3::new(0.0, 0.0, 1.2)));
//! assert!(!body.contains_point(Vec3::zero()));
//!
//! let hits = body.intersects_ray(Vec3::zero(), Vec3::new(0.0, 0.0, 1.0), 1);
//! assert!((hits[0].z - 0.5).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bounding::BoundingSphere;
use crate::transform::{Transform3D, Vec3};

const EPSILON: f64 = 1e-12;
/// Ray parameters closer than this are reported as a single intersection.
const HIT_MERGE_DISTANCE: f64 = 1e-9;

// ────────────────────────────────────────────────────────────────────────────
// Shape description
// ────────────────────────────────────────────────────────────────────────────

/// Geometry of a collision body, in the body's own frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    Sphere {
        radius: f64,
    },
    Box {
        /// Full edge lengths along X, Y, Z.
        size: [f64; 3],
    },
    Cylinder {
        radius: f64,
        length: f64,
    },
    Mesh {
        vertices: Vec<[f64; 3]>,
        triangles: Vec<[usize; 3]>,
    },
}

impl Shape {
    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Sphere { .. } => "sphere",
            Shape::Box { .. } => "box",
            Shape::Cylinder { .. } => "cylinder",
            Shape::Mesh { .. } => "mesh",
        }
    }
}

/// Reasons a [`Shape`] cannot be turned into a [`Body`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("{shape} {field} must be positive and finite, got {value}")]
    InvalidDimension {
        shape: &'static str,
        field: &'static str,
        value: f64,
    },

    #[error("mesh has no triangles")]
    EmptyMesh,

    #[error("mesh vertex {0} is not finite")]
    NonFiniteVertex(usize),

    #[error("mesh triangle {triangle} references vertex {index}, but the mesh has {count} vertices")]
    VertexOutOfRange {
        triangle: usize,
        index: usize,
        count: usize,
    },

    #[error("mesh does not enclose a volume")]
    DegenerateMesh,
}

fn positive(shape: &'static str, field: &'static str, value: f64) -> Result<f64, ShapeError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ShapeError::InvalidDimension {
            shape,
            field,
            value,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Local-frame solids
// ────────────────────────────────────────────────────────────────────────────

/// Geometry queries expressed in the body's own frame.
trait Solid {
    /// Recompute inflated dimensions after a scale or padding change.
    fn inflate(&mut self, scale: f64, padding: f64);
    fn contains_local(&self, p: Vec3) -> bool;
    /// Ray parameters `t >= 0` of every surface crossing, unordered.
    fn intersect_local(&self, origin: Vec3, dir: Vec3) -> Vec<f64>;
    fn local_bounding_sphere(&self) -> BoundingSphere;
    fn volume(&self) -> f64;
}

#[derive(Debug, Clone)]
struct SphereSolid {
    radius: f64,
    radius_u: f64,
    radius2: f64,
}

impl Solid for SphereSolid {
    fn inflate(&mut self, scale: f64, padding: f64) {
        self.radius_u = self.radius * scale + padding;
        self.radius2 = self.radius_u * self.radius_u;
    }

    fn contains_local(&self, p: Vec3) -> bool {
        p.norm_squared() < self.radius2
    }

    fn intersect_local(&self, origin: Vec3, dir: Vec3) -> Vec<f64> {
        let b = origin.dot(dir);
        let c = origin.norm_squared() - self.radius2;
        let disc = b * b - c;
        if disc < 0.0 {
            return Vec::new();
        }
        let root = disc.sqrt();
        [-b - root, -b + root]
            .into_iter()
            .filter(|t| *t >= 0.0)
            .collect()
    }

    fn local_bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere::new(Vec3::zero(), self.radius_u)
    }

    fn volume(&self) -> f64 {
        4.0 / 3.0 * std::f64::consts::PI * self.radius_u.powi(3)
    }
}

#[derive(Debug, Clone)]
struct BoxSolid {
    half: [f64; 3],
    half_u: [f64; 3],
}

impl Solid for BoxSolid {
    fn inflate(&mut self, scale: f64, padding: f64) {
        self.half_u = self.half.map(|h| h * scale + padding);
    }

    fn contains_local(&self, p: Vec3) -> bool {
        let p: [f64; 3] = p.into();
        p.iter().zip(self.half_u).all(|(c, h)| c.abs() < h)
    }

    fn intersect_local(&self, origin: Vec3, dir: Vec3) -> Vec<f64> {
        let o: [f64; 3] = origin.into();
        let d: [f64; 3] = dir.into();
        let mut t_near = f64::NEG_INFINITY;
        let mut t_far = f64::INFINITY;
        for axis in 0..3 {
            let h = self.half_u[axis];
            if d[axis].abs() < EPSILON {
                if o[axis].abs() > h {
                    return Vec::new();
                }
                continue;
            }
            let t1 = (-h - o[axis]) / d[axis];
            let t2 = (h - o[axis]) / d[axis];
            t_near = t_near.max(t1.min(t2));
            t_far = t_far.min(t1.max(t2));
            if t_near > t_far {
                return Vec::new();
            }
        }
        [t_near, t_far].into_iter().filter(|t| *t >= 0.0).collect()
    }

    fn local_bounding_sphere(&self) -> BoundingSphere {
        let [x, y, z] = self.half_u;
        BoundingSphere::new(Vec3::zero(), Vec3::new(x, y, z).norm())
    }

    fn volume(&self) -> f64 {
        8.0 * self.half_u.iter().product::<f64>()
    }
}

#[derive(Debug, Clone)]
struct CylinderSolid {
    radius: f64,
    half_length: f64,
    radius2: f64,
    half_length_u: f64,
}

impl Solid for CylinderSolid {
    fn inflate(&mut self, scale: f64, padding: f64) {
        let radius_u = self.radius * scale + padding;
        self.radius2 = radius_u * radius_u;
        self.half_length_u = self.half_length * scale + padding;
    }

    fn contains_local(&self, p: Vec3) -> bool {
        p.z.abs() < self.half_length_u && p.x * p.x + p.y * p.y < self.radius2
    }

    fn intersect_local(&self, origin: Vec3, dir: Vec3) -> Vec<f64> {
        let mut hits = Vec::with_capacity(2);

        // Lateral surface.
        let a = dir.x * dir.x + dir.y * dir.y;
        if a > EPSILON {
            let b = origin.x * dir.x + origin.y * dir.y;
            let c = origin.x * origin.x + origin.y * origin.y - self.radius2;
            let disc = b * b - a * c;
            if disc >= 0.0 {
                let root = disc.sqrt();
                for t in [(-b - root) / a, (-b + root) / a] {
                    if t >= 0.0 && (origin.z + t * dir.z).abs() <= self.half_length_u {
                        hits.push(t);
                    }
                }
            }
        }

        // End caps.
        if dir.z.abs() > EPSILON {
            for cap in [-self.half_length_u, self.half_length_u] {
                let t = (cap - origin.z) / dir.z;
                if t < 0.0 {
                    continue;
                }
                let x = origin.x + t * dir.x;
                let y = origin.y + t * dir.y;
                if x * x + y * y <= self.radius2 {
                    hits.push(t);
                }
            }
        }
        hits
    }

    fn local_bounding_sphere(&self) -> BoundingSphere {
        let radius = (self.radius2 + self.half_length_u * self.half_length_u).sqrt();
        BoundingSphere::new(Vec3::zero(), radius)
    }

    fn volume(&self) -> f64 {
        std::f64::consts::PI * self.radius2 * 2.0 * self.half_length_u
    }
}

/// Outward face plane `normal · p + offset = 0`.
#[derive(Debug, Clone, Copy)]
struct Plane {
    normal: Vec3,
    offset: f64,
}

#[derive(Debug, Clone)]
struct ConvexMeshSolid {
    vertices: Vec<Vec3>,
    triangles: Vec<[usize; 3]>,
    centroid: Vec3,
    scaled: Vec<Vec3>,
    planes: Vec<Plane>,
    radius_u: f64,
}

impl ConvexMeshSolid {
    fn new(vertices: &[[f64; 3]], triangles: &[[usize; 3]]) -> Result<Self, ShapeError> {
        if triangles.is_empty() {
            return Err(ShapeError::EmptyMesh);
        }
        let vertices: Vec<Vec3> = vertices.iter().map(|&v| Vec3::from(v)).collect();
        if let Some(i) = vertices.iter().position(|v| !v.is_finite()) {
            return Err(ShapeError::NonFiniteVertex(i));
        }
        for (triangle, tri) in triangles.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i >= vertices.len()) {
                return Err(ShapeError::VertexOutOfRange {
                    triangle,
                    index,
                    count: vertices.len(),
                });
            }
        }

        let centroid = vertices
            .iter()
            .fold(Vec3::zero(), |acc, v| acc + *v)
            / vertices.len() as f64;
        let mut solid = Self {
            vertices,
            triangles: triangles.to_vec(),
            centroid,
            scaled: Vec::new(),
            planes: Vec::new(),
            radius_u: 0.0,
        };
        solid.inflate(1.0, 0.0);
        if solid.planes.is_empty() || solid.volume() < EPSILON {
            return Err(ShapeError::DegenerateMesh);
        }
        Ok(solid)
    }

    fn corners(&self, tri: &[usize; 3]) -> (Vec3, Vec3, Vec3) {
        (self.scaled[tri[0]], self.scaled[tri[1]], self.scaled[tri[2]])
    }
}

impl Solid for ConvexMeshSolid {
    fn inflate(&mut self, scale: f64, padding: f64) {
        let c = self.centroid;
        self.scaled = self
            .vertices
            .iter()
            .map(|&v| {
                let arm = v - c;
                let push = arm.try_normalize().map_or(Vec3::zero(), |dir| dir * padding);
                c + arm * scale + push
            })
            .collect();

        self.planes = self
            .triangles
            .iter()
            .filter_map(|tri| {
                let (a, b, d) = self.corners(tri);
                let mut normal = (b - a).cross(d - a).try_normalize()?;
                if normal.dot(a - c) < 0.0 {
                    normal = -normal;
                }
                Some(Plane {
                    normal,
                    offset: -normal.dot(a),
                })
            })
            .collect();

        self.radius_u = self
            .scaled
            .iter()
            .map(|v| v.distance_squared(c))
            .fold(0.0, f64::max)
            .sqrt();
    }

    fn contains_local(&self, p: Vec3) -> bool {
        // A collapsed mesh has no face planes left and contains nothing.
        !self.planes.is_empty()
            && p.distance_squared(self.centroid) < self.radius_u * self.radius_u
            && self.planes.iter().all(|pl| pl.normal.dot(p) + pl.offset < 0.0)
    }

    fn intersect_local(&self, origin: Vec3, dir: Vec3) -> Vec<f64> {
        // Möller–Trumbore against every face, two-sided.
        self.triangles
            .iter()
            .filter_map(|tri| {
                let (a, b, c) = self.corners(tri);
                let e1 = b - a;
                let e2 = c - a;
                let pvec = dir.cross(e2);
                let det = e1.dot(pvec);
                if det.abs() < EPSILON {
                    return None;
                }
                let inv = 1.0 / det;
                let tvec = origin - a;
                let u = tvec.dot(pvec) * inv;
                if !(0.0..=1.0).contains(&u) {
                    return None;
                }
                let qvec = tvec.cross(e1);
                let v = dir.dot(qvec) * inv;
                if v < 0.0 || u + v > 1.0 {
                    return None;
                }
                let t = e2.dot(qvec) * inv;
                (t >= 0.0).then_some(t)
            })
            .collect()
    }

    fn local_bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere::new(self.centroid, self.radius_u)
    }

    fn volume(&self) -> f64 {
        let c = self.centroid;
        self.triangles
            .iter()
            .map(|tri| {
                let (a, b, d) = self.corners(tri);
                ((a - c).dot((b - c).cross(d - c))).abs() / 6.0
            })
            .sum()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Body
// ────────────────────────────────────────────────────────────────────────────

/// The closed set of solid kinds a [`Body`] can wrap.
#[derive(Debug, Clone)]
enum SolidKind {
    Sphere(SphereSolid),
    Box(BoxSolid),
    Cylinder(CylinderSolid),
    ConvexMesh(ConvexMeshSolid),
}

/// A posed, optionally inflated collision solid.
#[derive(Debug, Clone)]
pub struct Body {
    solid: SolidKind,
    pose: Transform3D,
    inverse: Transform3D,
    scale: f64,
    padding: f64,
}

impl Body {
    /// Build a body at the identity pose with scale 1 and no padding.
    pub fn from_shape(shape: &Shape) -> Result<Self, ShapeError> {
        let solid = match shape {
            Shape::Sphere { radius } => SolidKind::Sphere(SphereSolid {
                radius: positive("sphere", "radius", *radius)?,
                radius_u: 0.0,
                radius2: 0.0,
            }),
            Shape::Box { size } => SolidKind::Box(BoxSolid {
                half: [
                    positive("box", "size x", size[0])? * 0.5,
                    positive("box", "size y", size[1])? * 0.5,
                    positive("box", "size z", size[2])? * 0.5,
                ],
                half_u: [0.0; 3],
            }),
            Shape::Cylinder { radius, length } => SolidKind::Cylinder(CylinderSolid {
                radius: positive("cylinder", "radius", *radius)?,
                half_length: positive("cylinder", "length", *length)? * 0.5,
                radius2: 0.0,
                half_length_u: 0.0,
            }),
            Shape::Mesh {
                vertices,
                triangles,
            } => SolidKind::ConvexMesh(ConvexMeshSolid::new(vertices, triangles)?),
        };
        let mut body = Self {
            solid,
            pose: Transform3D::identity(),
            inverse: Transform3D::identity(),
            scale: 1.0,
            padding: 0.0,
        };
        body.reinflate();
        Ok(body)
    }

    fn solid(&self) -> &dyn Solid {
        match &self.solid {
            SolidKind::Sphere(s) => s,
            SolidKind::Box(s) => s,
            SolidKind::Cylinder(s) => s,
            SolidKind::ConvexMesh(s) => s,
        }
    }

    fn reinflate(&mut self) {
        let (scale, padding) = (self.scale, self.padding);
        match &mut self.solid {
            SolidKind::Sphere(s) => s.inflate(scale, padding),
            SolidKind::Box(s) => s.inflate(scale, padding),
            SolidKind::Cylinder(s) => s.inflate(scale, padding),
            SolidKind::ConvexMesh(s) => s.inflate(scale, padding),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.solid {
            SolidKind::Sphere(_) => "sphere",
            SolidKind::Box(_) => "box",
            SolidKind::Cylinder(_) => "cylinder",
            SolidKind::ConvexMesh(_) => "mesh",
        }
    }

    pub fn pose(&self) -> Transform3D {
        self.pose
    }

    /// Place the body.  Queries issued afterwards use the new placement.
    pub fn set_pose(&mut self, pose: Transform3D) {
        self.pose = Transform3D::new(pose.translation, pose.rotation.normalized());
        self.inverse = self.pose.inverse();
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
        self.reinflate();
    }

    pub fn padding(&self) -> f64 {
        self.padding
    }

    pub fn set_padding(&mut self, padding: f64) {
        self.padding = padding;
        self.reinflate();
    }

    /// Strict interior test against the inflated solid in its current pose.
    pub fn contains_point(&self, p: Vec3) -> bool {
        self.solid().contains_local(self.inverse.transform_point(p))
    }

    /// Points where the ray `origin + t * dir` (`t >= 0`) crosses the surface,
    /// nearest first.  At most `max_count` points are returned; `0` means no
    /// limit.  A zero direction never intersects.
    pub fn intersects_ray(&self, origin: Vec3, dir: Vec3, max_count: usize) -> Vec<Vec3> {
        let Some(dir) = dir.try_normalize() else {
            return Vec::new();
        };
        let local_origin = self.inverse.transform_point(origin);
        let local_dir = self.inverse.transform_vector(dir);

        let mut ts = self.solid().intersect_local(local_origin, local_dir);
        ts.sort_by(f64::total_cmp);
        ts.dedup_by(|later, earlier| (*later - *earlier).abs() < HIT_MERGE_DISTANCE);
        if max_count > 0 {
            ts.truncate(max_count);
        }
        ts.into_iter().map(|t| origin + dir * t).collect()
    }

    /// Sphere enclosing the inflated solid in its current pose.
    pub fn bounding_sphere(&self) -> BoundingSphere {
        let local = self.solid().local_bounding_sphere();
        BoundingSphere::new(self.pose.transform_point(local.center), local.radius)
    }

    /// Volume of the inflated solid.
    pub fn volume(&self) -> f64 {
        self.solid().volume()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Quaternion;
    use std::f64::consts::{FRAC_PI_4, PI};

    fn unit_cube_mesh() -> Shape {
        let vertices = vec![
            [-0.5, -0.5, -0.5],
            [0.5, -0.5, -0.5],
            [0.5, 0.5, -0.5],
            [-0.5, 0.5, -0.5],
            [-0.5, -0.5, 0.5],
            [0.5, -0.5, 0.5],
            [0.5, 0.5, 0.5],
            [-0.5, 0.5, 0.5],
        ];
        let triangles = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [2, 3, 7],
            [2, 7, 6],
            [1, 2, 6],
            [1, 6, 5],
            [0, 4, 7],
            [0, 7, 3],
        ];
        Shape::Mesh {
            vertices,
            triangles,
        }
    }

    fn body(shape: Shape) -> Body {
        Body::from_shape(&shape).unwrap()
    }

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).norm() < 1e-9
    }

    // ── Construction ─────────────────────────────────────────────────────────

    #[test]
    fn rejects_non_positive_dimensions() {
        let err = Body::from_shape(&Shape::Sphere { radius: 0.0 }).unwrap_err();
        assert!(matches!(err, ShapeError::InvalidDimension { field: "radius", .. }));
        let err = Body::from_shape(&Shape::Box {
            size: [1.0, f64::NAN, 1.0],
        })
        .unwrap_err();
        assert!(err.to_string().contains("size y"));
    }

    #[test]
    fn rejects_malformed_meshes() {
        let empty = Shape::Mesh {
            vertices: vec![[0.0; 3]],
            triangles: vec![],
        };
        assert_eq!(Body::from_shape(&empty).unwrap_err(), ShapeError::EmptyMesh);

        let out_of_range = Shape::Mesh {
            vertices: vec![[0.0; 3], [1.0, 0.0, 0.0]],
            triangles: vec![[0, 1, 2]],
        };
        assert!(matches!(
            Body::from_shape(&out_of_range).unwrap_err(),
            ShapeError::VertexOutOfRange { index: 2, .. }
        ));

        let flat = Shape::Mesh {
            vertices: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            triangles: vec![[0, 1, 2]],
        };
        assert_eq!(Body::from_shape(&flat).unwrap_err(), ShapeError::DegenerateMesh);
    }

    // ── Sphere ───────────────────────────────────────────────────────────────

    #[test]
    fn sphere_containment_follows_pose() {
        let mut s = body(Shape::Sphere { radius: 1.0 });
        assert!(s.contains_point(Vec3::new(0.0, 0.0, 0.9)));
        s.set_pose(Transform3D::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        assert!(!s.contains_point(Vec3::new(0.0, 0.0, 0.9)));
        assert!(s.contains_point(Vec3::new(5.0, 0.0, 0.9)));
    }

    #[test]
    fn sphere_scale_and_padding_inflate_radius() {
        let mut s = body(Shape::Sphere { radius: 1.0 });
        let p = Vec3::new(1.4, 0.0, 0.0);
        assert!(!s.contains_point(p));
        s.set_scale(1.2);
        s.set_padding(0.1);
        assert!(s.contains_point(p));
        assert!((s.bounding_sphere().radius - 1.3).abs() < 1e-12);
        assert!((s.volume() - 4.0 / 3.0 * PI * 1.3f64.powi(3)).abs() < 1e-9);
    }

    #[test]
    fn sphere_ray_hits_are_ordered() {
        let s = body(Shape::Sphere { radius: 1.0 });
        let hits = s.intersects_ray(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 0);
        assert_eq!(hits.len(), 2);
        assert!(close(hits[0], Vec3::new(-1.0, 0.0, 0.0)));
        assert!(close(hits[1], Vec3::new(1.0, 0.0, 0.0)));

        let first = s.intersects_ray(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0), 1);
        assert_eq!(first.len(), 1);
        assert!(close(first[0], Vec3::new(-1.0, 0.0, 0.0)));
    }

    #[test]
    fn ray_pointing_away_misses() {
        let s = body(Shape::Sphere { radius: 1.0 });
        assert!(s
            .intersects_ray(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0), 0)
            .is_empty());
        assert!(s.intersects_ray(Vec3::new(-5.0, 0.0, 0.0), Vec3::zero(), 0).is_empty());
    }

    #[test]
    fn ray_from_inside_reports_exit_only() {
        let s = body(Shape::Sphere { radius: 1.0 });
        let hits = s.intersects_ray(Vec3::zero(), Vec3::new(0.0, 1.0, 0.0), 0);
        assert_eq!(hits.len(), 1);
        assert!(close(hits[0], Vec3::new(0.0, 1.0, 0.0)));
    }

    // ── Box ──────────────────────────────────────────────────────────────────

    #[test]
    fn box_containment_uses_half_extents() {
        let b = body(Shape::Box {
            size: [1.0, 2.0, 4.0],
        });
        assert!(b.contains_point(Vec3::new(0.45, 0.95, 1.95)));
        assert!(!b.contains_point(Vec3::new(0.55, 0.0, 0.0)));
        assert!(!b.contains_point(Vec3::new(0.0, 0.0, 2.05)));
        assert!((b.volume() - 8.0).abs() < 1e-12);
    }

    #[test]
    fn rotated_box_containment() {
        let mut b = body(Shape::Box {
            size: [2.0, 0.2, 0.2],
        });
        // Long axis now along +Y.
        b.set_pose(Transform3D::new(
            Vec3::zero(),
            Quaternion::from_rpy(0.0, 0.0, std::f64::consts::FRAC_PI_2),
        ));
        assert!(b.contains_point(Vec3::new(0.0, 0.9, 0.0)));
        assert!(!b.contains_point(Vec3::new(0.9, 0.0, 0.0)));
    }

    #[test]
    fn box_ray_entry_and_exit() {
        let b = body(Shape::Box {
            size: [1.0, 1.0, 1.0],
        });
        let hits = b.intersects_ray(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, -1.0), 0);
        assert_eq!(hits.len(), 2);
        assert!(close(hits[0], Vec3::new(0.0, 0.0, 0.5)));
        assert!(close(hits[1], Vec3::new(0.0, 0.0, -0.5)));

        // Parallel to a face, outside the slab.
        assert!(b
            .intersects_ray(Vec3::new(0.0, 2.0, 10.0), Vec3::new(0.0, 0.0, -1.0), 0)
            .is_empty());
    }

    #[test]
    fn rotated_box_ray_hits_diagonal_face() {
        let mut b = body(Shape::Box {
            size: [1.0, 1.0, 1.0],
        });
        b.set_pose(Transform3D::new(Vec3::zero(), Quaternion::from_rpy(0.0, 0.0, FRAC_PI_4)));
        let hits = b.intersects_ray(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 1);
        // Corner of the yawed cube points at -X, half diagonal = √2 / 2.
        assert!(close(hits[0], Vec3::new(-(2.0f64.sqrt()) / 2.0, 0.0, 0.0)));
    }

    #[test]
    fn box_bounding_sphere_follows_pose() {
        let mut b = body(Shape::Box {
            size: [2.0, 2.0, 2.0],
        });
        b.set_pose(Transform3D::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        let s = b.bounding_sphere();
        assert!(close(s.center, Vec3::new(1.0, 2.0, 3.0)));
        assert!((s.radius - 3.0f64.sqrt()).abs() < 1e-12);
    }

    // ── Cylinder ─────────────────────────────────────────────────────────────

    #[test]
    fn cylinder_containment_along_z_axis() {
        let c = body(Shape::Cylinder {
            radius: 0.5,
            length: 2.0,
        });
        assert!(c.contains_point(Vec3::new(0.3, 0.3, 0.9)));
        assert!(!c.contains_point(Vec3::new(0.0, 0.0, 1.1)));
        assert!(!c.contains_point(Vec3::new(0.4, 0.4, 0.0)));
        assert!((c.volume() - PI * 0.25 * 2.0).abs() < 1e-12);
    }

    #[test]
    fn cylinder_ray_through_side_and_caps() {
        let c = body(Shape::Cylinder {
            radius: 0.5,
            length: 2.0,
        });
        let side = c.intersects_ray(Vec3::new(-3.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 0);
        assert_eq!(side.len(), 2);
        assert!(close(side[0], Vec3::new(-0.5, 0.0, 0.0)));

        let caps = c.intersects_ray(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0), 0);
        assert_eq!(caps.len(), 2);
        assert!(close(caps[0], Vec3::new(0.0, 0.0, 1.0)));
        assert!(close(caps[1], Vec3::new(0.0, 0.0, -1.0)));

        // Above the top cap, passing sideways: miss.
        assert!(c
            .intersects_ray(Vec3::new(-3.0, 0.0, 1.5), Vec3::new(1.0, 0.0, 0.0), 0)
            .is_empty());
    }

    #[test]
    fn cylinder_padding_applies_to_both_dimensions() {
        let mut c = body(Shape::Cylinder {
            radius: 0.5,
            length: 2.0,
        });
        c.set_padding(0.1);
        assert!(c.contains_point(Vec3::new(0.55, 0.0, 0.0)));
        assert!(c.contains_point(Vec3::new(0.0, 0.0, 1.05)));
    }

    // ── Convex mesh ──────────────────────────────────────────────────────────

    #[test]
    fn mesh_cube_matches_box_semantics() {
        let m = body(unit_cube_mesh());
        assert!(m.contains_point(Vec3::new(0.4, -0.4, 0.4)));
        assert!(!m.contains_point(Vec3::new(0.6, 0.0, 0.0)));
        assert!((m.volume() - 1.0).abs() < 1e-9);
        assert!((m.bounding_sphere().radius - 0.75f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn mesh_ray_merges_hits_on_shared_edges() {
        let m = body(unit_cube_mesh());
        // Goes exactly through the diagonal edge shared by two face triangles.
        let hits = m.intersects_ray(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0), 0);
        assert_eq!(hits.len(), 2, "{hits:?}");
        assert!(close(hits[0], Vec3::new(0.0, 0.0, 0.5)));
        assert!(close(hits[1], Vec3::new(0.0, 0.0, -0.5)));
    }

    #[test]
    fn mesh_scale_grows_about_centroid() {
        let mut m = body(unit_cube_mesh());
        m.set_pose(Transform3D::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        m.set_scale(2.0);
        assert!(m.contains_point(Vec3::new(10.9, 0.0, 0.0)));
        assert!(!m.contains_point(Vec3::new(11.1, 0.0, 0.0)));
        assert!((m.volume() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn zero_scale_mesh_contains_nothing() {
        let tetra = Shape::Mesh {
            vertices: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
            triangles: vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        };
        let mut m = body(tetra);
        assert!(m.contains_point(Vec3::new(0.1, 0.1, 0.1)));
        m.set_scale(0.0);
        assert!(!m.contains_point(Vec3::new(100.0, 100.0, 100.0)));
        assert!(!m.contains_point(Vec3::new(0.25, 0.25, 0.25)));
        assert_eq!(m.volume(), 0.0);

        m.set_padding(0.05);
        assert!(m.contains_point(Vec3::new(0.25, 0.25, 0.25)));
        assert!(!m.contains_point(Vec3::new(100.0, 100.0, 100.0)));
    }
}
