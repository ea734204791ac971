//! Wavefront OBJ export.
//!
//! Each part is written as its own group with its own vertex pool entries and
//! a `usemtl` switch; materials go to a companion MTL file.

use crate::error::Result;
use crate::export_scene::{ExportScene, ResolvedMaterial};
use std::fmt::Write;

fn material_name(index: usize) -> String {
    format!("material_{}", index)
}

/// Make a part name usable as an OBJ group name.
fn group_name(name: Option<&str>, index: usize) -> String {
    match name {
        Some(name) if !name.trim().is_empty() => name.split_whitespace().collect::<Vec<_>>().join("_"),
        _ => format!("part_{}", index),
    }
}

/// Export a flattened scene to OBJ format.
/// Returns (obj_content, mtl_content) as strings.
pub fn export_obj(scene: &ExportScene, name: &str) -> Result<(String, String)> {
    let total_verts = scene.total_vertices();
    let total_tris = scene.total_triangles();

    // Pre-size buffers: ~60 bytes per vertex line (v/vt/vn) × 3 + ~40 per face
    let mut obj = String::with_capacity(256 + total_verts * 180 + total_tris * 40);
    let mut mtl = String::with_capacity(256 * scene.materials().len().max(1));

    writeln!(obj, "# Scene Flatten OBJ Export")?;
    writeln!(obj, "# Vertices: {}", total_verts)?;
    writeln!(obj, "# Triangles: {}", total_tris)?;
    writeln!(obj)?;
    writeln!(obj, "mtllib {}.mtl", name)?;
    writeln!(obj, "o {}", name)?;

    // OBJ indices are global and 1-based.
    let mut vertex_offset = 1usize;
    for (index, part) in scene.parts().iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        writeln!(obj)?;
        writeln!(obj, "g {}", group_name(part.name.as_deref(), index))?;

        for (p, c) in part.positions.iter().zip(&part.colors) {
            writeln!(obj, "v {} {} {} {} {} {}", p[0], p[1], p[2], c[0], c[1], c[2])?;
        }
        for uv in &part.uvs {
            // OBJ texture space has a bottom-left origin.
            writeln!(obj, "vt {} {}", uv[0], 1.0 - uv[1])?;
        }
        for n in &part.normals {
            writeln!(obj, "vn {} {} {}", n[0], n[1], n[2])?;
        }

        writeln!(obj, "usemtl {}", material_name(part.material_index as usize))?;
        for tri in 0..part.triangle_count() {
            let i0 = vertex_offset + tri * 3;
            let (i1, i2) = (i0 + 1, i0 + 2);
            writeln!(
                obj,
                "f {}/{}/{} {}/{}/{} {}/{}/{}",
                i0, i0, i0, i1, i1, i1, i2, i2, i2
            )?;
        }
        vertex_offset += part.vertex_count();
    }

    writeln!(mtl, "# Scene Flatten Materials")?;
    for (index, material) in scene.materials().iter().enumerate() {
        writeln!(mtl)?;
        write_material(&mut mtl, index, material)?;
    }

    Ok((obj, mtl))
}

fn write_material(mtl: &mut String, index: usize, material: &ResolvedMaterial) -> Result<()> {
    let [r, g, b, a] = material.base_color;
    let [er, eg, eb] = material.emissive;

    if let Some(name) = material.name.as_deref().filter(|n| !n.is_empty()) {
        writeln!(mtl, "# {}", name)?;
    }
    writeln!(mtl, "newmtl {}", material_name(index))?;
    writeln!(mtl, "Kd {} {} {}", r, g, b)?;
    writeln!(mtl, "d {}", a)?;
    writeln!(mtl, "Ke {} {} {}", er, eg, eb)?;
    writeln!(mtl, "Pr {}", material.roughness)?;
    writeln!(mtl, "Pm {}", material.metallic)?;
    writeln!(mtl, "illum 2")?;
    if let Some(path) = &material.base_color_texture.path {
        writeln!(mtl, "map_Kd {}", path)?;
    }
    if let Some(path) = &material.emissive_texture.path {
        writeln!(mtl, "map_Ke {}", path)?;
    }
    if let Some(path) = &material.normal_texture.path {
        writeln!(mtl, "norm {}", path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesher::{flatten_scene, FlattenConfig};
    use crate::scene::{MaterialMap, MeshPart, RawMaterial, RawMesh, RawNode, RawScene, RawTexture};
    use glam::DMat4;

    fn two_material_scene() -> ExportScene {
        let mut raw = RawScene::new();
        let wood = raw.add_texture(RawTexture::file("wood.png"));
        let mut oak = RawMaterial::new("oak");
        oak.legacy.diffuse_color = MaterialMap {
            value: Some(crate::scene::MapValue::Vec3([0.5, 0.25, 0.0])),
            texture: Some(wood),
        };
        let oak = raw.add_material(oak);
        let mut glass = RawMaterial::new("glass");
        glass.legacy.transparency_factor = MaterialMap::real(0.75);
        let glass = raw.add_material(glass);

        let mut mesh = RawMesh::from_polygons(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            &[&[0, 1, 2], &[0, 2, 3]],
        );
        mesh.material_parts = vec![
            MeshPart {
                index: 0,
                face_indices: vec![0],
            },
            MeshPart {
                index: 1,
                face_indices: vec![1],
            },
        ];
        mesh.materials = vec![oak, glass];
        let mesh = raw.add_mesh(mesh);
        raw.add_node(
            RawNode::new("table top")
                .with_mesh(mesh)
                .with_geometry_to_world(DMat4::IDENTITY),
        );
        flatten_scene(raw, &FlattenConfig::default()).unwrap()
    }

    #[test]
    fn test_export_obj_groups_and_faces() {
        let (obj, _) = export_obj(&two_material_scene(), "test").unwrap();

        assert!(obj.contains("mtllib test.mtl"));
        assert!(obj.contains("g table_top"));
        assert!(obj.contains("v 0 0 0 1 1 1"));
        assert!(obj.contains("vn 0 0 1"));
        assert!(obj.contains("usemtl material_0"));
        assert!(obj.contains("usemtl material_1"));
        assert!(obj.contains("f 1/1/1 2/2/2 3/3/3"));
        // Second part continues the global vertex numbering.
        assert!(obj.contains("f 4/4/4 5/5/5 6/6/6"));
    }

    #[test]
    fn test_export_mtl_properties() {
        let (_, mtl) = export_obj(&two_material_scene(), "test").unwrap();

        assert!(mtl.contains("# oak"));
        assert!(mtl.contains("newmtl material_0"));
        assert!(mtl.contains("Kd 0.5 0.25 0"));
        assert!(mtl.contains("map_Kd wood.png"));
        assert!(mtl.contains("newmtl material_1"));
        assert!(mtl.contains("d 0.25"));
        assert!(mtl.contains("Pr 1"));
    }

    #[test]
    fn test_group_name() {
        assert_eq!(group_name(Some("a b\tc"), 0), "a_b_c");
        assert_eq!(group_name(Some("  "), 3), "part_3");
        assert_eq!(group_name(None, 1), "part_1");
    }
}
