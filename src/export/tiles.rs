//! 3D Tiles 1.1 tileset export.
//!
//! The flattened scene is placed on the globe with a [`GeoContext`] and cut
//! into a regular grid of square leaf tiles in the horizontal (east/north)
//! plane. Triangles crossing a tile border are clipped against it. Every
//! non-empty tile becomes a GLB under `tiles/`, and `tileset.json` lists the
//! tiles as children of one root.

use super::gltf::{export_glb, export_glb_with_textures, TextureCache, TextureMode};
use crate::error::{FlattenError, Result};
use crate::export_scene::{ExportScene, MeshPartInfo, ResolvedMaterial};
use crate::geo::GeoContext;
use crate::scene::RawScene;
use glam::{DVec3, Vec2, Vec3, Vec4};
use log::{debug, info};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::BufWriter;
use std::path::Path;

/// Clipping tolerance in ENU meters.
const CLIP_EPSILON: f64 = 1e-9;
/// Squared doubled area below which a clipped triangle is dropped.
const DEGENERATE_AREA_SQ: f64 = 1e-20;

/// Placement and tiling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TilesetOptions {
    /// Geodetic latitude of the scene origin, in degrees.
    pub origin_lat: f64,
    /// Geodetic longitude of the scene origin, in degrees.
    pub origin_lon: f64,
    /// Height of the scene origin above the ellipsoid, in meters.
    pub origin_height: f64,
    /// Clockwise rotation about up, in degrees.
    pub heading: f64,
    /// Scene units to meters.
    pub scale: f64,
    /// Edge length of a level-0 tile, in meters.
    pub tile_size: f64,
    /// Leaf tiles are halved until no larger than this.
    pub min_tile_size: f64,
    /// Leaf level; derived from `min_tile_size` when `None`.
    pub max_level: Option<u32>,
    /// Embed images in every tile instead of sharing a `textures/` directory.
    pub embed_textures: bool,
}

impl Default for TilesetOptions {
    fn default() -> Self {
        Self {
            origin_lat: 39.918058,
            origin_lon: 116.397026,
            origin_height: 50.0,
            heading: 0.0,
            scale: 1.0,
            tile_size: 100.0,
            min_tile_size: 12.5,
            max_level: None,
            embed_textures: false,
        }
    }
}

impl TilesetOptions {
    /// The leaf level these options produce.
    pub fn leaf_level(&self) -> u32 {
        self.max_level
            .unwrap_or_else(|| compute_max_level(self.tile_size, self.min_tile_size))
    }

    /// Edge length of a leaf tile, in meters.
    pub fn leaf_size(&self) -> f64 {
        self.tile_size / 2_f64.powi(self.leaf_level() as i32)
    }
}

/// One vertex during clipping.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Vertex {
    /// Scene-space position, written to the tile.
    local: DVec3,
    /// Scaled, heading-rotated position used for tiling.
    enu: DVec3,
    normal: Vec3,
    uv: Vec2,
    color: Vec4,
}

impl Vertex {
    fn of(part: &MeshPartInfo, index: usize, geo: &GeoContext) -> Self {
        let local = part
            .positions
            .get(index)
            .map_or(DVec3::ZERO, |p| Vec3::from(*p).as_dvec3());
        Self {
            local,
            enu: geo.transform_local(local),
            normal: part.normals.get(index).map_or(Vec3::Y, |n| Vec3::from(*n)),
            uv: part.uvs.get(index).map_or(Vec2::ZERO, |uv| Vec2::from(*uv)),
            color: part.colors.get(index).map_or(Vec4::ONE, |c| Vec4::from(*c)),
        }
    }

    fn lerp(&self, other: &Self, t: f64) -> Self {
        let tf = t as f32;
        let normal = self.normal.lerp(other.normal, tf);
        Self {
            local: self.local.lerp(other.local, t),
            enu: self.enu.lerp(other.enu, t),
            normal: normal.try_normalize().unwrap_or(normal),
            uv: self.uv.lerp(other.uv, tf),
            color: self.color.lerp(other.color, tf),
        }
    }
}

/// Triangles of one leaf tile, one part per source material.
#[derive(Debug)]
struct TileBucket {
    parts: BTreeMap<u32, MeshPartInfo>,
    min: DVec3,
    max: DVec3,
}

impl Default for TileBucket {
    fn default() -> Self {
        Self {
            parts: BTreeMap::new(),
            min: DVec3::INFINITY,
            max: DVec3::NEG_INFINITY,
        }
    }
}

/// Every leaf tile that received geometry, plus scene-wide local bounds.
#[derive(Debug)]
struct TileGrid {
    buckets: HashMap<(i32, i32), TileBucket>,
    min: DVec3,
    max: DVec3,
}

/// A 3D Tiles `box` bounding volume: a center and three half-axis vectors.
#[derive(Debug, Clone, Copy, PartialEq)]
struct OrientedBox {
    center: DVec3,
    half_axes: [DVec3; 3],
}

impl OrientedBox {
    fn from_bounds(min: DVec3, max: DVec3) -> Self {
        let half = (max - min) * 0.5;
        Self {
            center: (min + max) * 0.5,
            half_axes: [DVec3::X * half.x, DVec3::Y * half.y, DVec3::Z * half.z],
        }
    }

    /// Re-express a box from glTF's Y-up frame in the tileset's Z-up frame.
    fn y_up_to_z_up(self) -> Self {
        let rotate = |v: DVec3| DVec3::new(v.x, -v.z, v.y);
        Self {
            center: rotate(self.center),
            half_axes: self.half_axes.map(rotate),
        }
    }

    fn to_array(self) -> [f64; 12] {
        let [x, y, z] = self.half_axes;
        [
            self.center.x, self.center.y, self.center.z,
            x.x, x.y, x.z,
            y.x, y.y, y.z,
            z.x, z.y, z.z,
        ]
    }
}

/// Write a 3D Tiles 1.1 tileset for `scene` into `output_dir`.
///
/// Produces `tileset.json`, one `tiles/L{level}_X{x}_Z{z}.glb` per non-empty
/// leaf tile and, unless textures are embedded, a shared `textures/`
/// directory. Returns the number of tiles written.
pub fn export_tileset(scene: &ExportScene, output_dir: &Path, options: &TilesetOptions) -> Result<usize> {
    if scene.is_empty() {
        return Err(FlattenError::Export("Scene has no mesh data".to_string()));
    }
    if !(options.tile_size > 0.0) {
        return Err(FlattenError::Export("tile_size must be positive".to_string()));
    }
    if !(options.min_tile_size > 0.0) {
        return Err(FlattenError::Export("min_tile_size must be positive".to_string()));
    }

    let geo = GeoContext::new(
        options.origin_lat,
        options.origin_lon,
        options.origin_height,
        options.heading,
        options.scale,
    );
    let level = options.leaf_level();
    let leaf_size = options.leaf_size();

    let grid = bucket_triangles(scene, &geo, leaf_size);
    if grid.buckets.is_empty() {
        return Err(FlattenError::Export(
            "no triangles were assigned to tiles".to_string(),
        ));
    }

    let tiles_dir = output_dir.join("tiles");
    fs::create_dir_all(&tiles_dir)?;
    let mut texture_cache = if options.embed_textures {
        None
    } else {
        let textures_dir = output_dir.join("textures");
        fs::create_dir_all(&textures_dir)?;
        Some(TextureCache::new(textures_dir, "../textures"))
    };

    let (min_x, max_x, min_z, max_z) = tile_index_bounds(&grid.buckets);
    let (global_min, global_max) = (grid.min, grid.max);

    let mut tiles: Vec<((i32, i32), TileBucket)> = grid.buckets.into_iter().collect();
    tiles.sort_by_key(|&((x, z), _)| (z, x));

    let pad = DVec3::splat(options.tile_size * 0.01);
    let mut children = Vec::with_capacity(tiles.len());
    for ((x, z), bucket) in tiles {
        let filename = tile_filename(level, x, z);
        let mut min = bucket.min;
        let mut max = bucket.max;
        min.y = global_min.y;
        max.y = global_max.y;

        let tile_scene = build_tile_scene(bucket, scene);
        let glb = match texture_cache.as_mut() {
            Some(cache) => export_glb_with_textures(&tile_scene, TextureMode::External(cache))?,
            None => export_glb(&tile_scene)?,
        };
        fs::write(tiles_dir.join(&filename), &glb)?;
        debug!("Wrote tile {} ({} bytes)", filename, glb.len());

        let bounds = OrientedBox::from_bounds(min - pad, max + pad).y_up_to_z_up();
        children.push(json!({
            "boundingVolume": { "box": bounds.to_array() },
            "geometricError": 0.0,
            "refine": "REPLACE",
            "content": { "uri": format!("tiles/{}", filename) }
        }));
    }

    let root_box = grid_extent_box(
        (min_x, max_x),
        (min_z, max_z),
        leaf_size,
        (global_min.y, global_max.y),
        &geo,
    )
    .y_up_to_z_up();
    // Large enough that the root always refines to its children.
    let force_refine_error = options.tile_size * 0.5 * 1_000_000.0;

    let tile_count = children.len();
    let tileset = json!({
        "asset": {
            "version": "1.1",
            "generator": concat!("scene-flatten ", env!("CARGO_PKG_VERSION"))
        },
        "geometricError": force_refine_error,
        "root": {
            "transform": geo.transform_matrix(),
            "boundingVolume": { "box": root_box.to_array() },
            "geometricError": force_refine_error,
            "refine": "REPLACE",
            "children": children
        }
    });

    let file = fs::File::create(output_dir.join("tileset.json"))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &tileset)?;

    info!(
        "Wrote {} tiles (level {}, {} m leaves) to {}",
        tile_count,
        level,
        leaf_size,
        output_dir.display()
    );
    Ok(tile_count)
}

/// Halve `tile_size` until it is no larger than `min_tile_size`.
pub fn compute_max_level(tile_size: f64, min_tile_size: f64) -> u32 {
    let mut level = 0;
    let mut size = tile_size;
    while size > min_tile_size {
        size *= 0.5;
        level += 1;
    }
    level
}

fn tile_filename(level: u32, x: i32, z: i32) -> String {
    format!("L{level}_X{x}_Z{z}.glb")
}

/// Clip every triangle of `scene` into the leaf tiles it overlaps.
fn bucket_triangles(scene: &ExportScene, geo: &GeoContext, leaf_size: f64) -> TileGrid {
    let mut grid = TileGrid {
        buckets: HashMap::new(),
        min: DVec3::INFINITY,
        max: DVec3::NEG_INFINITY,
    };

    for part in scene.parts() {
        for tri in 0..part.triangle_count() {
            let vertices = [0, 1, 2].map(|corner| Vertex::of(part, tri * 3 + corner, geo));
            let (lo, hi) = vertices
                .iter()
                .fold((DVec3::INFINITY, DVec3::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v.enu), hi.max(v.enu))
                });

            let cell = |v: f64| (v / leaf_size).floor() as i32;
            for tile_x in cell(lo.x)..=cell(hi.x) {
                let x0 = tile_x as f64 * leaf_size;
                for tile_z in cell(lo.z)..=cell(hi.z) {
                    let z0 = tile_z as f64 * leaf_size;
                    let polygon = clip_triangle_to_tile(&vertices, x0, x0 + leaf_size, z0, z0 + leaf_size);
                    if polygon.len() < 3 {
                        continue;
                    }

                    let bucket = grid.buckets.entry((tile_x, tile_z)).or_default();
                    let first = polygon[0];
                    for pair in polygon[1..].windows(2) {
                        let triangle = [first, pair[0], pair[1]];
                        if is_degenerate(&triangle) {
                            continue;
                        }
                        for v in &triangle {
                            bucket.min = bucket.min.min(v.local);
                            bucket.max = bucket.max.max(v.local);
                            grid.min = grid.min.min(v.local);
                            grid.max = grid.max.max(v.local);
                        }

                        let builder = bucket.parts.entry(part.material_index).or_insert_with(|| {
                            MeshPartInfo::new(part.name.clone(), part.material_index)
                        });
                        builder.has_normals |= part.has_normals;
                        builder.has_uvs |= part.has_uvs;
                        builder.has_colors |= part.has_colors;
                        for v in &triangle {
                            builder.positions.push(v.local.as_vec3().to_array());
                            builder.normals.push(v.normal.to_array());
                            builder.uvs.push(v.uv.to_array());
                            builder.colors.push(v.color.to_array());
                        }
                    }
                }
            }
        }
    }
    grid
}

/// Sutherland-Hodgman clip of a triangle to `[x0, x1] x [z0, z1]` in ENU.
fn clip_triangle_to_tile(vertices: &[Vertex; 3], x0: f64, x1: f64, z0: f64, z1: f64) -> Vec<Vertex> {
    let mut polygon = vertices.to_vec();
    for (axis, value, keep_greater) in [(0, x0, true), (0, x1, false), (2, z0, true), (2, z1, false)] {
        polygon = clip_polygon(&polygon, axis, value, keep_greater);
        if polygon.is_empty() {
            break;
        }
    }
    polygon
}

fn clip_polygon(vertices: &[Vertex], axis: usize, value: f64, keep_greater: bool) -> Vec<Vertex> {
    let inside = |v: &Vertex| {
        if keep_greater {
            v.enu[axis] >= value - CLIP_EPSILON
        } else {
            v.enu[axis] <= value + CLIP_EPSILON
        }
    };

    let Some(last) = vertices.last() else {
        return Vec::new();
    };
    let mut output = Vec::with_capacity(vertices.len() + 1);
    let mut prev = last;
    let mut prev_inside = inside(prev);
    for curr in vertices {
        let curr_inside = inside(curr);
        if curr_inside != prev_inside {
            output.push(intersect(prev, curr, axis, value));
        }
        if curr_inside {
            output.push(*curr);
        }
        prev = curr;
        prev_inside = curr_inside;
    }
    output
}

/// The point on segment `a`-`b` where `axis` equals `value`.
fn intersect(a: &Vertex, b: &Vertex, axis: usize, value: f64) -> Vertex {
    let denom = b.enu[axis] - a.enu[axis];
    let t = if denom.abs() < 1e-12 {
        0.0
    } else {
        ((value - a.enu[axis]) / denom).clamp(0.0, 1.0)
    };
    a.lerp(b, t)
}

fn is_degenerate(triangle: &[Vertex; 3]) -> bool {
    let [a, b, c] = triangle;
    (b.enu - a.enu).cross(c.enu - a.enu).length_squared() < DEGENERATE_AREA_SQ
}

/// A self-contained scene holding one tile's parts and the materials they use.
fn build_tile_scene(bucket: TileBucket, scene: &ExportScene) -> ExportScene {
    let mut materials = Vec::with_capacity(bucket.parts.len());
    let mut parts = Vec::with_capacity(bucket.parts.len());
    // Keys are ascending, so materials keep their relative order.
    for (new_index, (old_index, mut part)) in bucket.parts.into_iter().enumerate() {
        materials.push(
            scene
                .materials()
                .get(old_index as usize)
                .cloned()
                .unwrap_or_else(ResolvedMaterial::default_white),
        );
        part.material_index = new_index as u32;
        parts.push(part);
    }

    let tile = ExportScene::new(materials, parts, scene.right_axis(), scene.up_axis(), RawScene::new());
    match scene.source_dir() {
        Some(dir) => tile.with_source_dir(dir),
        None => tile,
    }
}

fn tile_index_bounds(buckets: &HashMap<(i32, i32), TileBucket>) -> (i32, i32, i32, i32) {
    buckets.keys().fold(
        (i32::MAX, i32::MIN, i32::MAX, i32::MIN),
        |(min_x, max_x, min_z, max_z), &(x, z)| (min_x.min(x), max_x.max(x), min_z.min(z), max_z.max(z)),
    )
}

/// Box around the occupied tile range, in scene space (before heading and
/// scale).
fn grid_extent_box(
    (min_tile_x, max_tile_x): (i32, i32),
    (min_tile_z, max_tile_z): (i32, i32),
    leaf_size: f64,
    (min_y, max_y): (f64, f64),
    geo: &GeoContext,
) -> OrientedBox {
    let pad_enu = leaf_size * 0.005;

    let min_x = min_tile_x as f64 * leaf_size;
    let max_x = (max_tile_x + 1) as f64 * leaf_size;
    let min_z = min_tile_z as f64 * leaf_size;
    let max_z = (max_tile_z + 1) as f64 * leaf_size;
    let center_x = 0.5 * (min_x + max_x);
    let center_z = 0.5 * (min_z + max_z);
    let half_x = 0.5 * (max_x - min_x) + pad_enu;
    let half_z = 0.5 * (max_z - min_z) + pad_enu;

    let (sin_h, cos_h) = geo.heading().sin_cos();
    let inv_scale = if geo.scale().abs() < 1e-12 { 0.0 } else { 1.0 / geo.scale() };

    let (min_y, max_y) = if max_y < min_y { (max_y, min_y) } else { (min_y, max_y) };
    let pad_y = ((max_y - min_y) * 0.02).max(pad_enu * inv_scale.abs());
    let (min_y, max_y) = (min_y - pad_y, max_y + pad_y);

    OrientedBox {
        center: DVec3::new(
            (center_x * cos_h + center_z * sin_h) * inv_scale,
            0.5 * (min_y + max_y),
            (-center_x * sin_h + center_z * cos_h) * inv_scale,
        ),
        half_axes: [
            DVec3::new(cos_h, 0.0, -sin_h) * half_x * inv_scale,
            DVec3::new(0.0, 0.5 * (max_y - min_y), 0.0),
            DVec3::new(sin_h, 0.0, cos_h) * half_z * inv_scale,
        ],
    }
}
