//! Scene flattening.
//!
//! This module turns a loaded [`RawScene`] into an [`ExportScene`]: it
//! resolves the material table, splits every mesh node into per-material
//! parts and emits their triangles in world space.

pub mod emitter;
pub mod partition;
pub mod triangulate;

pub use emitter::VertexEmitter;
pub use partition::{plan_scene, FaceSelection, PartPlan};
pub use triangulate::Triangulator;

use crate::error::{FlattenError, Result};
use crate::export_scene::{ExportScene, MeshPartInfo};
use crate::resolver::{MaterialTable, TextureResolver, MAX_TEXTURE_DEPTH};
use crate::scene::{JsonSceneLoader, LoadOptions, RawScene, SceneLoader};
use log::{debug, warn};
use std::path::Path;

/// What to do with a part whose vertex buffers can't be allocated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartFailurePolicy {
    /// Keep the part with zero vertices.
    #[default]
    Degrade,
    /// Leave the part out of the output.
    Skip,
    /// Fail the whole load.
    Abort,
}

/// Flattening configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenConfig {
    /// Flip texture V so the origin is top-left.
    pub flip_v: bool,
    /// Handling of parts that fail to allocate.
    pub part_failure: PartFailurePolicy,
    /// Bound on layered/shader texture indirection chains.
    pub max_texture_depth: usize,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            flip_v: true,
            part_failure: PartFailurePolicy::Degrade,
            max_texture_depth: MAX_TEXTURE_DEPTH,
        }
    }
}

impl FlattenConfig {
    pub fn with_flip_v(mut self, flip_v: bool) -> Self {
        self.flip_v = flip_v;
        self
    }

    pub fn with_part_failure(mut self, policy: PartFailurePolicy) -> Self {
        self.part_failure = policy;
        self
    }

    pub fn with_max_texture_depth(mut self, depth: usize) -> Self {
        self.max_texture_depth = depth;
        self
    }
}

/// Loads scene files through a [`SceneLoader`] and flattens them.
pub struct Flattener<L = JsonSceneLoader> {
    loader: L,
    config: FlattenConfig,
}

impl<L: SceneLoader> Flattener<L> {
    /// Create a flattener with default configuration.
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            config: FlattenConfig::default(),
        }
    }

    pub fn with_config(mut self, config: FlattenConfig) -> Self {
        self.config = config;
        self
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &FlattenConfig {
        &self.config
    }

    /// Load the scene at `path` and flatten it.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<ExportScene> {
        let path = path.as_ref();
        let raw = self
            .loader
            .load(path, &LoadOptions::fixed())
            .map_err(|reason| FlattenError::load(&path.display().to_string(), &reason))?;
        debug!(
            "Loaded {}: {} nodes, {} meshes, {} materials, {} textures",
            path.display(),
            raw.nodes.len(),
            raw.meshes.len(),
            raw.materials.len(),
            raw.textures.len()
        );
        let scene = flatten_scene(raw, &self.config)?;
        Ok(match path.parent() {
            Some(dir) => scene.with_source_dir(dir),
            None => scene,
        })
    }
}

impl Default for Flattener<JsonSceneLoader> {
    fn default() -> Self {
        Self::new(JsonSceneLoader)
    }
}

/// Flatten an already-loaded scene graph.
///
/// `raw` must carry evaluated world transforms, as every [`SceneLoader`]
/// produces. The graph is retained by the result until it is released.
pub fn flatten_scene(raw: RawScene, config: &FlattenConfig) -> Result<ExportScene> {
    let table = MaterialTable::build(&raw, config.max_texture_depth);
    let plans = plan_scene(&raw, &table);
    let emitter = VertexEmitter::new(
        TextureResolver::new(&raw).with_max_depth(config.max_texture_depth),
        config,
    );

    let mut parts = Vec::with_capacity(plans.len());
    for plan in &plans {
        match emitter.emit(plan) {
            Ok(part) => parts.push(part),
            Err(err) => {
                if let Some(part) = on_part_failure(config.part_failure, err, plan)? {
                    parts.push(part);
                }
            }
        }
    }
    drop(plans);

    let materials = table.into_materials();
    debug!(
        "Flattened scene: {} materials, {} parts, {} triangles",
        materials.len(),
        parts.len(),
        parts.iter().map(MeshPartInfo::triangle_count).sum::<usize>()
    );

    let (right, up) = (raw.axes.right, raw.axes.up);
    Ok(ExportScene::new(materials, parts, right, up, raw))
}

/// Apply `policy` to a part that failed to emit.
fn on_part_failure(
    policy: PartFailurePolicy,
    err: FlattenError,
    plan: &PartPlan<'_>,
) -> Result<Option<MeshPartInfo>> {
    match policy {
        PartFailurePolicy::Abort => Err(err),
        PartFailurePolicy::Skip => {
            warn!("Skipping part: {}", err);
            Ok(None)
        }
        PartFailurePolicy::Degrade => {
            warn!("Keeping empty part: {}", err);
            let name = (!plan.node.name.is_empty()).then(|| plan.node.name.clone());
            Ok(Some(MeshPartInfo::new(name, plan.material_index)))
        }
    }
}
