//! Kinematic capsule world.
//!
//! One upright capsule per living player, moved against the static arena
//! colliders with axis-separated sliding. Y never changes: the arena is
//! flat and ledges under `STEP_HEIGHT` are walked over by ignoring
//! colliders that end below them. All calls happen on the tick task.

use std::collections::HashMap;
use std::sync::Arc;

use crate::arena::{Aabb, StaticArenaGeometry, Triangle};
use crate::config;

#[derive(Debug, Clone, Copy)]
struct Capsule {
    x: f64,
    z: f64,
}

pub struct PhysicsWorld {
    geometry: Arc<StaticArenaGeometry>,
    capsules: HashMap<String, Capsule>,
}

impl PhysicsWorld {
    pub fn new(geometry: Arc<StaticArenaGeometry>) -> Self {
        Self { geometry, capsules: HashMap::new() }
    }

    pub fn geometry(&self) -> &StaticArenaGeometry {
        &self.geometry
    }

    /// Allocate a capsule at `(x, z)`. A duplicate id replaces the old body.
    pub fn create_capsule(&mut self, id: &str, x: f64, z: f64) {
        self.capsules.insert(id.to_string(), Capsule { x, z });
    }

    pub fn teleport(&mut self, id: &str, x: f64, z: f64) {
        if let Some(c) = self.capsules.get_mut(id) {
            c.x = x;
            c.z = z;
        }
    }

    pub fn remove(&mut self, id: &str) {
        self.capsules.remove(id);
    }

    pub fn position(&self, id: &str) -> Option<(f64, f64)> {
        self.capsules.get(id).map(|c| (c.x, c.z))
    }

    /// Move a capsule by `(dx, dz)` with wall sliding; returns the resulting
    /// position. Displacement is sub-stepped so a fast body cannot tunnel
    /// through a thin collider. Unknown ids return `None`.
    pub fn move_capsule(&mut self, id: &str, dx: f64, dz: f64) -> Option<(f64, f64)> {
        let cur = *self.capsules.get(id)?;
        let (x, z) = slide_move(&self.geometry, cur.x, cur.z, dx, dz);
        let c = self.capsules.get_mut(id)?;
        c.x = x;
        c.z = z;
        Some((x, z))
    }

    /// Distance to the first static collider along a horizontal ray, or
    /// `None` if the ray is clear over `max_len`.
    pub fn ray_first_hit(&self, ox: f64, oz: f64, angle_rad: f64, max_len: f64) -> Option<f64> {
        ray_first_hit(&self.geometry, ox, oz, angle_rad, max_len)
    }

    /// AABB test against the building list, used for spawn validation.
    pub fn is_inside_building(&self, x: f64, z: f64, radius: f64) -> bool {
        self.geometry
            .buildings
            .iter()
            .any(|b| blocks_capsule(b) && b.intersects_circle_xz(x, z, radius))
    }
}

// ─── Move and slide ──────────────────────────────────────────────────

/// Colliders whose top sits below the step height are walked over.
fn blocks_capsule(b: &Aabb) -> bool {
    b.max_y > config::FLOOR_Y + config::STEP_HEIGHT
}

fn collides_at(geometry: &StaticArenaGeometry, x: f64, z: f64) -> bool {
    let r = config::PLAYER_RADIUS;
    geometry
        .buildings
        .iter()
        .filter(|&b| blocks_capsule(b))
        .chain(geometry.walls.iter())
        .any(|b| b.intersects_circle_xz(x, z, r))
}

fn clamp_to_bounds(x: f64, z: f64) -> (f64, f64) {
    let r = config::PLAYER_RADIUS;
    (
        x.clamp(config::ARENA_MIN_X + r, config::ARENA_MAX_X - r),
        z.clamp(config::ARENA_MIN_Z + r, config::ARENA_MAX_Z - r),
    )
}

/// Axis-separated slide: each sub-step tries the full XZ move, then each
/// axis alone, keeping whichever components stay clear of the colliders.
fn slide_move(geometry: &StaticArenaGeometry, start_x: f64, start_z: f64, dx: f64, dz: f64) -> (f64, f64) {
    let dist = (dx * dx + dz * dz).sqrt();
    let max_step = config::PLAYER_RADIUS * 0.5;
    let steps = (dist / max_step).ceil().max(1.0) as usize;
    let (sx, sz) = (dx / steps as f64, dz / steps as f64);

    let mut x = start_x;
    let mut z = start_z;
    for _ in 0..steps {
        let (tx, tz) = clamp_to_bounds(x + sx, z + sz);
        if !collides_at(geometry, tx, tz) {
            x = tx;
            z = tz;
            continue;
        }
        // Slide: keep one axis at a time.
        let (ax, _) = clamp_to_bounds(x + sx, z);
        if !collides_at(geometry, ax, z) {
            x = ax;
            continue;
        }
        let (_, az) = clamp_to_bounds(x, z + sz);
        if !collides_at(geometry, x, az) {
            z = az;
            continue;
        }
        break; // fully blocked
    }
    (x, z)
}

// ─── Raycasting ──────────────────────────────────────────────────────

fn ray_first_hit(
    geometry: &StaticArenaGeometry,
    ox: f64,
    oz: f64,
    angle_rad: f64,
    max_len: f64,
) -> Option<f64> {
    let origin = [ox, config::PLAYER_Y, oz];
    let dir = [angle_rad.sin(), 0.0, angle_rad.cos()];

    let mut nearest: Option<f64> = None;
    let mut consider = |t: f64| {
        if t >= 0.0 && t <= max_len && nearest.map_or(true, |n| t < n) {
            nearest = Some(t);
        }
    };

    for tri in &geometry.triangles {
        if let Some(t) = ray_triangle(origin, dir, tri) {
            consider(t);
        }
    }
    for wall in &geometry.walls {
        if let Some(t) = ray_aabb(origin, dir, wall) {
            consider(t);
        }
    }
    // A synthetic arena may carry buildings without a triangle mesh.
    if geometry.triangles.is_empty() {
        for b in geometry.buildings.iter().filter(|&b| blocks_capsule(b)) {
            if let Some(t) = ray_aabb(origin, dir, b) {
                consider(t);
            }
        }
    }
    nearest
}

/// Möller–Trumbore, front and back faces.
fn ray_triangle(origin: [f64; 3], dir: [f64; 3], tri: &Triangle) -> Option<f64> {
    const EPS: f64 = 1e-9;
    let e1 = sub(tri.b, tri.a);
    let e2 = sub(tri.c, tri.a);
    let p = cross(dir, e2);
    let det = dot(e1, p);
    if det.abs() < EPS {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = sub(origin, tri.a);
    let u = dot(s, p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = cross(s, e1);
    let v = dot(dir, q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = dot(e2, q) * inv_det;
    (t > EPS).then_some(t)
}

/// Slab-method ray vs box.
fn ray_aabb(origin: [f64; 3], dir: [f64; 3], b: &Aabb) -> Option<f64> {
    let mins = [b.min_x, b.min_y, b.min_z];
    let maxs = [b.max_x, b.max_y, b.max_z];
    let mut t_near = f64::NEG_INFINITY;
    let mut t_far = f64::INFINITY;

    for axis in 0..3 {
        if dir[axis].abs() < 1e-12 {
            if origin[axis] < mins[axis] || origin[axis] > maxs[axis] {
                return None;
            }
            continue;
        }
        let inv = 1.0 / dir[axis];
        let mut t0 = (mins[axis] - origin[axis]) * inv;
        let mut t1 = (maxs[axis] - origin[axis]) * inv;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_near = t_near.max(t0);
        t_far = t_far.min(t1);
        if t_near > t_far {
            return None;
        }
    }
    if t_far < 0.0 {
        return None;
    }
    Some(t_near.max(0.0))
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}
