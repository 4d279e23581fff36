//! Static arena geometry, baked once at startup.
//!
//! Walks the glTF scene graph, transforms every mesh primitive to world
//! space, rescales the whole map to `ARENA_SIZE`, and classifies each mesh
//! as floor, clutter, or building. Buildings keep their AABB (for bot
//! heuristics and spawn validation) and their triangles (for raycasting).

use std::path::Path;

use tracing::{info, warn};

use crate::config;

// ─── Value types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min_x: f64,
    pub min_y: f64,
    pub min_z: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub max_z: f64,
}

impl Aabb {
    pub fn new(min_x: f64, min_y: f64, min_z: f64, max_x: f64, max_y: f64, max_z: f64) -> Self {
        Self { min_x, min_y, min_z, max_x, max_y, max_z }
    }

    /// Smallest box enclosing a vertex set. Returns `None` for an empty set.
    pub fn from_points(points: &[[f64; 3]]) -> Option<Self> {
        let first = points.first()?;
        let mut b = Aabb::new(first[0], first[1], first[2], first[0], first[1], first[2]);
        for p in &points[1..] {
            b.min_x = b.min_x.min(p[0]);
            b.min_y = b.min_y.min(p[1]);
            b.min_z = b.min_z.min(p[2]);
            b.max_x = b.max_x.max(p[0]);
            b.max_y = b.max_y.max(p[1]);
            b.max_z = b.max_z.max(p[2]);
        }
        Some(b)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn depth(&self) -> f64 {
        self.max_z - self.min_z
    }

    /// XZ overlap test against a circle of `radius` at `(x, z)`.
    pub fn intersects_circle_xz(&self, x: f64, z: f64, radius: f64) -> bool {
        let cx = x.clamp(self.min_x, self.max_x);
        let cz = z.clamp(self.min_z, self.max_z);
        let dx = x - cx;
        let dz = z - cz;
        dx * dx + dz * dz <= radius * radius
    }
}

/// One world-space triangle of the collision mesh.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub a: [f64; 3],
    pub b: [f64; 3],
    pub c: [f64; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPoint {
    pub x: f64,
    pub z: f64,
}

/// Immutable after startup; any number of workers may read it.
pub struct StaticArenaGeometry {
    pub buildings: Vec<Aabb>,
    pub walls: [Aabb; 4],
    pub triangles: Vec<Triangle>,
    pub spawn_points: Vec<SpawnPoint>,
}

#[derive(Debug)]
pub enum GeometryError {
    /// The map file parsed but contained no mesh data at all.
    EmptyMap(String),
    Gltf(gltf::Error),
}

impl std::fmt::Display for GeometryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMap(path) => write!(f, "map {path} contains no mesh"),
            Self::Gltf(e) => write!(f, "gltf: {e}"),
        }
    }
}

impl std::error::Error for GeometryError {}

// ─── Classification ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshClass {
    Floor,
    Clutter,
    Building,
}

/// Classify a world-space mesh bounding box.
///
/// Floor and clutter are discarded for collision; only buildings keep
/// their AABB and triangles.
pub fn classify(bounds: &Aabb) -> MeshClass {
    let h = bounds.height();
    let w = bounds.width();
    let d = bounds.depth();

    if h < config::FLOOR_MAX_HEIGHT
        && w > config::ARENA_SIZE * config::FLOOR_MIN_EXTENT_FRAC
        && d > config::ARENA_SIZE * config::FLOOR_MIN_EXTENT_FRAC
    {
        return MeshClass::Floor;
    }

    let max_extent = config::ARENA_SIZE * config::CLUTTER_MAX_EXTENT_FRAC;
    if h < config::CLUTTER_MAX_HEIGHT
        || w < config::CLUTTER_MIN_EXTENT
        || d < config::CLUTTER_MIN_EXTENT
        || w > max_extent
        || d > max_extent
    {
        return MeshClass::Clutter;
    }

    MeshClass::Building
}

// ─── Perimeter walls ─────────────────────────────────────────────────

fn perimeter_walls() -> [Aabb; 4] {
    let t = config::WALL_THICKNESS;
    let h = config::WALL_HEIGHT;
    let (min_x, max_x) = (config::ARENA_MIN_X, config::ARENA_MAX_X);
    let (min_z, max_z) = (config::ARENA_MIN_Z, config::ARENA_MAX_Z);
    [
        // -X and +X walls
        Aabb::new(min_x - t, 0.0, min_z - t, min_x, h, max_z + t),
        Aabb::new(max_x, 0.0, min_z - t, max_x + t, h, max_z + t),
        // -Z and +Z walls
        Aabb::new(min_x - t, 0.0, min_z - t, max_x + t, h, min_z),
        Aabb::new(min_x - t, 0.0, max_z, max_x + t, h, max_z + t),
    ]
}

/// Ring of evenly spaced spawn points, used when the map carries no markers.
fn fallback_spawn_ring() -> Vec<SpawnPoint> {
    let r = config::ARENA_SIZE * 0.35;
    (0..8)
        .map(|i| {
            let angle = i as f64 / 8.0 * std::f64::consts::TAU;
            SpawnPoint { x: angle.sin() * r, z: angle.cos() * r }
        })
        .collect()
}

// ─── Transform helpers ───────────────────────────────────────────────

type Mat4 = [[f64; 4]; 4];

const IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Column-major multiply, matching glTF's matrix layout.
fn mat_mul(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [[0.0; 4]; 4];
    for (col, out_col) in out.iter_mut().enumerate() {
        for (row, cell) in out_col.iter_mut().enumerate() {
            *cell = (0..4).map(|k| a[k][row] * b[col][k]).sum();
        }
    }
    out
}

fn transform_point(m: &Mat4, p: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * p[0] + m[1][0] * p[1] + m[2][0] * p[2] + m[3][0],
        m[0][1] * p[0] + m[1][1] * p[1] + m[2][1] * p[2] + m[3][1],
        m[0][2] * p[0] + m[1][2] * p[1] + m[2][2] * p[2] + m[3][2],
    ]
}

fn node_matrix(node: &gltf::Node) -> Mat4 {
    let m = node.transform().matrix();
    let mut out = [[0.0; 4]; 4];
    for (i, col) in m.iter().enumerate() {
        for (j, v) in col.iter().enumerate() {
            out[i][j] = *v as f64;
        }
    }
    out
}

// ─── glTF walk ───────────────────────────────────────────────────────

struct CollectedMesh {
    vertices: Vec<[f64; 3]>,
    indices: Vec<[usize; 3]>,
}

struct Collected {
    meshes: Vec<CollectedMesh>,
    /// (name-derived key, world position) in discovery order.
    spawn_markers: Vec<(String, [f64; 3])>,
}

fn is_spawn_marker(name: &str) -> bool {
    name.starts_with("player_spawn_") || name.starts_with("spawn_")
}

fn walk_node(
    node: &gltf::Node,
    parent: &Mat4,
    buffers: &[gltf::buffer::Data],
    out: &mut Collected,
) {
    let world = mat_mul(parent, &node_matrix(node));

    if let Some(name) = node.name() {
        if is_spawn_marker(name) {
            let pos = transform_point(&world, [0.0, 0.0, 0.0]);
            out.spawn_markers.push((name.to_string(), pos));
        }
    }

    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| &d.0[..]));
            let Some(positions) = reader.read_positions() else { continue };
            let vertices: Vec<[f64; 3]> = positions
                .map(|p| transform_point(&world, [p[0] as f64, p[1] as f64, p[2] as f64]))
                .collect();
            if vertices.is_empty() {
                continue;
            }

            let indices: Vec<[usize; 3]> = match reader.read_indices() {
                Some(idx) => {
                    let flat: Vec<usize> = idx.into_u32().map(|i| i as usize).collect();
                    flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect()
                }
                // Non-indexed primitive: consecutive vertex triples.
                None => (0..vertices.len() / 3).map(|i| [i * 3, i * 3 + 1, i * 3 + 2]).collect(),
            };

            out.meshes.push(CollectedMesh { vertices, indices });
        }
    }

    for child in node.children() {
        walk_node(&child, &world, buffers, out);
    }
}

// ─── Public entry points ─────────────────────────────────────────────

/// Load and bake the arena from a glTF file.
///
/// Missing file falls back to [`empty_arena`]; a file that parses but has
/// no mesh is a startup failure, the core cannot run without a floor.
pub fn load(map_path: &str) -> Result<StaticArenaGeometry, GeometryError> {
    if !Path::new(map_path).exists() {
        warn!("Map file {map_path} not found, using perimeter-only arena");
        return Ok(empty_arena());
    }

    let (document, buffers, _images) = gltf::import(map_path).map_err(GeometryError::Gltf)?;

    let mut collected = Collected { meshes: Vec::new(), spawn_markers: Vec::new() };
    for scene in document.scenes() {
        for node in scene.nodes() {
            walk_node(&node, &IDENTITY, &buffers, &mut collected);
        }
    }

    if collected.meshes.is_empty() {
        return Err(GeometryError::EmptyMap(map_path.to_string()));
    }

    Ok(bake(collected, map_path))
}

/// Zero buildings, perimeter walls, ring of fallback spawns.
pub fn empty_arena() -> StaticArenaGeometry {
    StaticArenaGeometry {
        buildings: Vec::new(),
        walls: perimeter_walls(),
        triangles: Vec::new(),
        spawn_points: fallback_spawn_ring(),
    }
}

/// Synthetic arena built from explicit building boxes. The boxes are
/// triangulated so raycasts behave exactly as they would against a baked
/// mesh. Used by tests and by local setups without a map file.
pub fn arena_from_boxes(buildings: Vec<Aabb>, spawn_points: Vec<SpawnPoint>) -> StaticArenaGeometry {
    let triangles = buildings.iter().flat_map(box_triangles).collect();
    let spawn_points = if spawn_points.is_empty() { fallback_spawn_ring() } else { spawn_points };
    StaticArenaGeometry {
        buildings,
        walls: perimeter_walls(),
        triangles,
        spawn_points,
    }
}

/// The twelve triangles of a box's six faces.
pub fn box_triangles(b: &Aabb) -> Vec<Triangle> {
    let v = [
        [b.min_x, b.min_y, b.min_z],
        [b.max_x, b.min_y, b.min_z],
        [b.max_x, b.max_y, b.min_z],
        [b.min_x, b.max_y, b.min_z],
        [b.min_x, b.min_y, b.max_z],
        [b.max_x, b.min_y, b.max_z],
        [b.max_x, b.max_y, b.max_z],
        [b.min_x, b.max_y, b.max_z],
    ];
    const FACES: [[usize; 4]; 6] = [
        [0, 1, 2, 3], // -Z
        [5, 4, 7, 6], // +Z
        [4, 0, 3, 7], // -X
        [1, 5, 6, 2], // +X
        [4, 5, 1, 0], // bottom
        [3, 2, 6, 7], // top
    ];
    FACES
        .iter()
        .flat_map(|f| {
            [
                Triangle { a: v[f[0]], b: v[f[1]], c: v[f[2]] },
                Triangle { a: v[f[0]], b: v[f[2]], c: v[f[3]] },
            ]
        })
        .collect()
}

fn bake(collected: Collected, map_path: &str) -> StaticArenaGeometry {
    // Fit the whole map into the arena: uniform scale on the larger XZ span,
    // then recentre on the world origin.
    let all_points: Vec<[f64; 3]> = collected.meshes.iter().flat_map(|m| m.vertices.iter().copied()).collect();
    let bounds = Aabb::from_points(&all_points).expect("meshes verified non-empty");

    let span_x = bounds.width();
    let span_z = bounds.depth();
    let scale = config::ARENA_SIZE / span_x.max(span_z).max(1e-6);
    let center_x = (bounds.min_x + bounds.max_x) / 2.0;
    let center_z = (bounds.min_z + bounds.max_z) / 2.0;
    let floor_y = bounds.min_y;

    let to_world = |p: [f64; 3]| -> [f64; 3] {
        [
            (p[0] - center_x) * scale,
            (p[1] - floor_y) * scale,
            (p[2] - center_z) * scale,
        ]
    };

    let mut buildings = Vec::new();
    let mut triangles = Vec::new();
    let mut floors = 0usize;
    let mut clutter = 0usize;

    for mesh in &collected.meshes {
        let world_vertices: Vec<[f64; 3]> = mesh.vertices.iter().map(|v| to_world(*v)).collect();
        let mesh_bounds = match Aabb::from_points(&world_vertices) {
            Some(b) => b,
            None => continue,
        };

        match classify(&mesh_bounds) {
            MeshClass::Floor => floors += 1,
            MeshClass::Clutter => clutter += 1,
            MeshClass::Building => {
                buildings.push(mesh_bounds);
                for [i, j, k] in &mesh.indices {
                    let (Some(a), Some(b), Some(c)) = (
                        world_vertices.get(*i).copied(),
                        world_vertices.get(*j).copied(),
                        world_vertices.get(*k).copied(),
                    ) else {
                        continue;
                    };
                    triangles.push(Triangle { a, b, c });
                }
            }
        }
    }

    // Spawn markers, deduplicated by name in discovery order.
    let mut spawn_points: Vec<SpawnPoint> = Vec::new();
    let mut seen_names: Vec<String> = Vec::new();
    for (name, pos) in &collected.spawn_markers {
        if seen_names.contains(name) {
            continue;
        }
        seen_names.push(name.clone());
        let w = to_world(*pos);
        spawn_points.push(SpawnPoint { x: w[0], z: w[2] });
    }
    if spawn_points.is_empty() {
        warn!("Map {map_path} has no spawn markers, using fallback ring");
        spawn_points = fallback_spawn_ring();
    }

    info!(
        "Arena baked from {map_path}: {} buildings ({} triangles), {floors} floor, {clutter} clutter meshes, {} spawns",
        buildings.len(),
        triangles.len(),
        spawn_points.len()
    );

    StaticArenaGeometry {
        buildings,
        walls: perimeter_walls(),
        triangles,
        spawn_points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Classification thresholds ───────────────────────────────────────

    #[test]
    fn classify_flat_wide_mesh_as_floor() {
        let b = Aabb::new(-28.0, 0.0, -28.0, 28.0, 0.2, 28.0);
        assert_eq!(classify(&b), MeshClass::Floor);
    }

    #[test]
    fn classify_short_mesh_as_clutter() {
        // Tall enough extents but under the 2.0 height cutoff.
        let b = Aabb::new(0.0, 0.0, 0.0, 5.0, 1.5, 5.0);
        assert_eq!(classify(&b), MeshClass::Clutter);
    }

    #[test]
    fn classify_thin_mesh_as_clutter() {
        let b = Aabb::new(0.0, 0.0, 0.0, 1.0, 6.0, 8.0);
        assert_eq!(classify(&b), MeshClass::Clutter);
    }

    #[test]
    fn classify_huge_mesh_as_clutter() {
        // Wider than half the arena in X.
        let b = Aabb::new(-20.0, 0.0, 0.0, 20.0, 6.0, 8.0);
        assert_eq!(classify(&b), MeshClass::Clutter);
    }

    #[test]
    fn classify_box_as_building() {
        let b = Aabb::new(0.0, 0.0, 0.0, 6.0, 5.0, 8.0);
        assert_eq!(classify(&b), MeshClass::Building);
    }

    // ── AABB helpers ────────────────────────────────────────────────────

    #[test]
    fn aabb_from_points_encloses_all() {
        let b = Aabb::from_points(&[[1.0, 2.0, 3.0], [-1.0, 5.0, 0.0]]).unwrap();
        assert_eq!(b.min_x, -1.0);
        assert_eq!(b.max_y, 5.0);
        assert_eq!(b.max_z, 3.0);
    }

    #[test]
    fn aabb_from_points_empty_is_none() {
        assert!(Aabb::from_points(&[]).is_none());
    }

    #[test]
    fn circle_test_hits_touching_edge() {
        let b = Aabb::new(0.0, 0.0, 0.0, 2.0, 2.0, 2.0);
        assert!(b.intersects_circle_xz(2.4, 1.0, 0.5));
        assert!(!b.intersects_circle_xz(2.6, 1.0, 0.5));
        assert!(b.intersects_circle_xz(1.0, 1.0, 0.1)); // inside
    }

    // ── Fallback arena ──────────────────────────────────────────────────

    #[test]
    fn empty_arena_has_walls_and_spawns() {
        let arena = empty_arena();
        assert!(arena.buildings.is_empty());
        assert_eq!(arena.spawn_points.len(), 8);
        // Every spawn is inside the playable bounds.
        for sp in &arena.spawn_points {
            assert!(sp.x > config::ARENA_MIN_X && sp.x < config::ARENA_MAX_X);
            assert!(sp.z > config::ARENA_MIN_Z && sp.z < config::ARENA_MAX_Z);
        }
        // Walls sit just outside the play area.
        assert!(arena.walls[0].max_x <= config::ARENA_MIN_X);
        assert!(arena.walls[1].min_x >= config::ARENA_MAX_X);
    }

    #[test]
    fn spawn_ring_points_are_distinct() {
        let arena = empty_arena();
        for (i, a) in arena.spawn_points.iter().enumerate() {
            for b in &arena.spawn_points[i + 1..] {
                let d = ((a.x - b.x).powi(2) + (a.z - b.z).powi(2)).sqrt();
                assert!(d > config::MIN_SPAWN_SEPARATION);
            }
        }
    }

    // ── Transform math ──────────────────────────────────────────────────

    #[test]
    fn transform_point_applies_translation() {
        let mut m = IDENTITY;
        m[3] = [10.0, 20.0, 30.0, 1.0];
        assert_eq!(transform_point(&m, [1.0, 2.0, 3.0]), [11.0, 22.0, 33.0]);
    }

    #[test]
    fn mat_mul_identity_is_noop() {
        let mut m = IDENTITY;
        m[3] = [4.0, 5.0, 6.0, 1.0];
        let out = mat_mul(&IDENTITY, &m);
        assert_eq!(out, m);
    }

    #[test]
    fn spawn_marker_names() {
        assert!(is_spawn_marker("player_spawn_1"));
        assert!(is_spawn_marker("spawn_3"));
        assert!(!is_spawn_marker("building_2"));
    }
}
