//! Scene Flatten CLI
//!
//! Flatten 3D scene documents into GLB or OBJ files, or 3D Tiles tilesets.

use clap::{Parser, Subcommand, ValueEnum};
use scene_flatten::{
    export_glb, export_obj, export_tileset, ExportScene, FlattenConfig, Flattener,
    JsonSceneLoader, TilesetOptions,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "scene-flatten")]
#[command(author, version, about = "Flatten 3D scenes into per-material triangle buffers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a scene document to GLB or OBJ
    Convert {
        /// Input scene document
        input: PathBuf,

        /// Output file path (extension added if missing)
        output: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "glb")]
        format: OutputFormat,

        /// Keep texture V as authored instead of flipping to a top-left origin
        #[arg(long)]
        no_flip_v: bool,
    },

    /// Export a georeferenced 3D Tiles 1.1 tileset
    Tiles {
        /// Input scene document
        input: PathBuf,

        /// Output directory for tileset.json, tiles/ and textures/
        output_dir: PathBuf,

        /// Latitude of the scene origin in degrees
        #[arg(long, default_value_t = 39.918058, allow_hyphen_values = true)]
        origin_lat: f64,

        /// Longitude of the scene origin in degrees
        #[arg(long, default_value_t = 116.397026, allow_hyphen_values = true)]
        origin_lon: f64,

        /// Height of the scene origin above the ellipsoid in meters
        #[arg(long, default_value_t = 50.0, allow_hyphen_values = true)]
        origin_height: f64,

        /// Clockwise rotation about up in degrees
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        heading: f64,

        /// Scene units to meters
        #[arg(long, default_value_t = 1.0)]
        scale: f64,

        /// Edge length of a level-0 tile in meters
        #[arg(long, default_value_t = 100.0)]
        tile_size: f64,

        /// Halve tiles until they are no larger than this
        #[arg(long, default_value_t = 12.5)]
        min_tile_size: f64,

        /// Leaf level (overrides --min-tile-size)
        #[arg(long)]
        max_level: Option<u32>,

        /// Embed textures in every tile instead of sharing textures/
        #[arg(long)]
        embed_textures: bool,

        /// Keep texture V as authored instead of flipping to a top-left origin
        #[arg(long)]
        no_flip_v: bool,
    },

    /// Show the materials and parts of a scene document
    Info {
        /// Input scene document
        input: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Binary glTF format
    Glb,
    /// Wavefront OBJ format
    Obj,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            output,
            format,
            no_flip_v,
        } => {
            let config = FlattenConfig::default().with_flip_v(!no_flip_v);
            let scene = load(&input, config)?;
            export_scene(&scene, &output, format)?;
        }
        Commands::Tiles {
            input,
            output_dir,
            origin_lat,
            origin_lon,
            origin_height,
            heading,
            scale,
            tile_size,
            min_tile_size,
            max_level,
            embed_textures,
            no_flip_v,
        } => {
            let config = FlattenConfig::default().with_flip_v(!no_flip_v);
            let scene = load(&input, config)?;
            let options = TilesetOptions {
                origin_lat,
                origin_lon,
                origin_height,
                heading,
                scale,
                tile_size,
                min_tile_size,
                max_level,
                embed_textures,
            };
            fs::create_dir_all(&output_dir)?;
            let tiles = export_tileset(&scene, &output_dir, &options)?;
            println!(
                "Exported {} tiles (level {}) to {:?}",
                tiles,
                options.leaf_level(),
                output_dir.join("tileset.json")
            );
        }
        Commands::Info { input } => {
            let scene = load(&input, FlattenConfig::default())?;
            show_scene_info(&scene);
        }
    }

    Ok(())
}

fn load(input: &Path, config: FlattenConfig) -> Result<ExportScene, Box<dyn std::error::Error>> {
    println!("Loading scene from {:?}...", input);
    let scene = Flattener::new(JsonSceneLoader)
        .with_config(config)
        .load(input)?;
    println!(
        "  {} materials, {} parts, {} vertices, {} triangles",
        scene.materials().len(),
        scene.parts().len(),
        scene.total_vertices(),
        scene.total_triangles()
    );
    Ok(scene)
}

fn show_scene_info(scene: &ExportScene) {
    println!("\nScene Info:");
    println!("  Right axis: {}", scene.right_axis());
    println!("  Up axis: {}", scene.up_axis());
    if let Some(bounds) = scene.bounds() {
        println!("  Bounds: {:?} .. {:?}", bounds.min, bounds.max);
    }

    println!("\nMaterials:");
    for (i, material) in scene.materials().iter().enumerate() {
        println!(
            "  [{}] {} base={:?} metallic={} roughness={}{}",
            i,
            material.name.as_deref().unwrap_or("<default>"),
            material.base_color,
            material.metallic,
            material.roughness,
            if material.double_sided { " double-sided" } else { "" }
        );
        for (slot, texture) in [
            ("base color", &material.base_color_texture),
            ("normal", &material.normal_texture),
            ("emissive", &material.emissive_texture),
        ] {
            if texture.is_empty() {
                continue;
            }
            println!(
                "      {} texture: {} ({} embedded bytes)",
                slot,
                texture.path.as_deref().unwrap_or("<embedded>"),
                texture.content_len()
            );
        }
    }

    println!("\nParts:");
    for (i, part) in scene.parts().iter().enumerate() {
        println!(
            "  [{}] {} material={} triangles={} normals={} uvs={} colors={}",
            i,
            part.name.as_deref().unwrap_or("<unnamed>"),
            part.material_index,
            part.triangle_count(),
            part.has_normals,
            part.has_uvs,
            part.has_colors
        );
    }
}

fn export_scene(
    scene: &ExportScene,
    path: &Path,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Glb => {
            let glb_path = if path.extension().is_some() {
                path.to_path_buf()
            } else {
                path.with_extension("glb")
            };
            let glb_data = export_glb(scene)?;
            fs::write(&glb_path, &glb_data)?;
            println!("Exported GLB ({} bytes) to {:?}", glb_data.len(), glb_path);
        }
        OutputFormat::Obj => {
            let obj_path = if path.extension().is_some() {
                path.to_path_buf()
            } else {
                path.with_extension("obj")
            };
            let mtl_path = obj_path.with_extension("mtl");
            let name = obj_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("scene");
            let (obj, mtl) = export_obj(scene, name)?;

            fs::write(&obj_path, obj)?;
            fs::write(&mtl_path, mtl)?;

            println!("Exported OBJ to {:?}", obj_path);
            println!("  Material: {:?}", mtl_path);
        }
    }

    Ok(())
}
