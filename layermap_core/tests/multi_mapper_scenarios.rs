// layermap_core/tests/multi_mapper_scenarios.rs

use approx::assert_abs_diff_eq;
use layermap_core::layers::global_voxel_index;
use layermap_core::prelude::*;
use nalgebra::{Point3, Vector3};
use std::sync::Arc;

const VOXEL_SIZE: f32 = 0.1;
const ROWS: usize = 30;
const COLS: usize = 40;
const WALL_DEPTH: f32 = 3.0;
const BOX_DEPTH: f32 = 1.5;

fn camera() -> Camera {
    Camera::new(40.0, 40.0, 20.0, 15.0, COLS, ROWS).unwrap()
}

fn in_box(row: usize, col: usize) -> bool {
    (10..20).contains(&row) && (15..25).contains(&col)
}

fn wall() -> DepthImage {
    DepthImage::filled(ROWS, COLS, WALL_DEPTH)
}

fn wall_with_box() -> DepthImage {
    DepthImage::from_fn(ROWS, COLS, |r, c| if in_box(r, c) { BOX_DEPTH } else { WALL_DEPTH })
}

fn box_mask() -> MonoImage {
    MonoImage::from_fn(ROWS, COLS, |r, c| if in_box(r, c) { 255 } else { 0 })
}

fn params_with_small_components() -> MultiMapperParams {
    MultiMapperParams {
        connected_mask_component_size_threshold: 10,
        ..MultiMapperParams::default()
    }
}

fn build(mapping_type: MappingType) -> MultiMapper {
    MultiMapper::with_params(
        VOXEL_SIZE,
        mapping_type,
        EsdfMode::ThreeD,
        MemoryType::Device,
        Arc::new(ExecutionStream::new("test")),
        params_with_small_components(),
        MapperParams::default(),
        None,
    )
    .unwrap()
}

/// The voxel just in front of the box surface, on the optical axis.
fn box_voxel() -> Vector3<i32> {
    global_voxel_index(&Point3::new(0.0, 0.0, BOX_DEPTH - 0.05), VOXEL_SIZE)
}

fn is_high_confidence_freespace(mm: &MultiMapper, index: &Vector3<i32>) -> bool {
    mm.unmasked_mapper()
        .freespace_layer()
        .get_voxel_by_index(index)
        .is_some_and(|v| v.is_high_confidence_freespace)
}

#[test]
fn vacated_region_becomes_free_again() {
    let mut mm = build(MappingType::Dynamic);
    let pose = Transform::identity();
    let voxel = box_voxel();
    let mut saw_dynamic_frame = false;

    for frame in 0..90i64 {
        let depth = if (15..50).contains(&frame) { wall_with_box() } else { wall() };
        mm.integrate_depth(&depth, &pose, &camera(), Some(frame * 100))
            .unwrap();

        if frame == 14 {
            assert!(is_high_confidence_freespace(&mm, &voxel));
            assert!(mm.masked_mapper().unwrap().occupancy_layer().is_empty());
        }
        if frame == 15 {
            // The box appears in space that has been empty for over a second.
            assert!(!mm.last_dynamic_pointcloud().is_empty());
            let masked = mm.last_depth_frame_masked().unwrap();
            assert_eq!(masked[(15, 20)], BOX_DEPTH);
            assert_eq!(masked[(0, 0)], -1.0);
            saw_dynamic_frame = true;
        }
        if frame == 49 {
            // Occupied for long enough that the box is now part of the static map.
            assert!(!is_high_confidence_freespace(&mm, &voxel));
            assert!(mm.last_dynamic_pointcloud().is_empty());
        }
        if frame >= 70 {
            // Once free again the voxel must not flip back and forth.
            assert!(is_high_confidence_freespace(&mm, &voxel), "frame {frame}");
        }
    }

    assert!(saw_dynamic_frame);
    assert!(!mm.masked_mapper().unwrap().occupancy_layer().is_empty());
    assert!(is_high_confidence_freespace(&mm, &voxel));
}

#[test]
fn esdf_skips_sites_in_high_confidence_freespace() {
    let mut mm = build(MappingType::Dynamic);
    let pose = Transform::identity();
    for frame in 0..30i64 {
        let depth = if frame >= 15 { wall_with_box() } else { wall() };
        mm.integrate_depth(&depth, &pose, &camera(), Some(frame * 100))
            .unwrap();
    }
    let voxel = box_voxel();
    assert!(is_high_confidence_freespace(&mm, &voxel));
    let tsdf_voxel = *mm
        .unmasked_mapper()
        .tsdf_layer()
        .get_voxel_by_index(&voxel)
        .unwrap();
    assert!(tsdf_voxel.distance.abs() <= VOXEL_SIZE);

    let stats = mm.update_esdf();
    assert!(stats.unmasked.num_excluded_sites > 0);
    assert!(stats.masked.is_some());

    let unmasked = mm.unmasked_mapper();
    for (index, esdf_voxel) in unmasked.esdf_layer().iter_voxels() {
        if esdf_voxel.is_site {
            assert!(!unmasked
                .freespace_layer()
                .get_voxel_by_index(&index)
                .is_some_and(|v| v.is_high_confidence_freespace));
        }
    }
    assert!(!unmasked.esdf_layer().get_voxel_by_index(&voxel).unwrap().is_site);
}

#[test]
fn static_plane_produces_mesh_at_plane_depth() {
    let mut mm = build(MappingType::StaticTsdf);
    let depth = DepthImage::filled(ROWS, COLS, 2.0);
    mm.integrate_depth(&depth, &Transform::identity(), &camera(), None)
        .unwrap();
    mm.integrate_color(
        &ColorImage::filled(ROWS, COLS, Color::GREEN),
        &Transform::identity(),
        &camera(),
    )
    .unwrap();

    let mesh = mm.update_mesh(None, true);
    assert!(!mesh.vertices.is_empty());
    assert!(!mesh.triangle_indices.is_empty());
    for v in &mesh.vertices {
        assert_abs_diff_eq!(v.z, 2.0, epsilon = 0.05);
    }
    assert!(mesh.colors.iter().any(|&c| c == Color::GREEN));
    assert_eq!(&mesh.to_bytes()[0..4], b"LMSH");

    // Nothing new to send.
    assert!(mm.update_mesh(None, false).is_empty());
}

#[test]
fn empty_human_mask_matches_static_tsdf() {
    let mut human = build(MappingType::HumanWithStaticTsdf);
    let mut reference = build(MappingType::StaticTsdf);
    let pose = Transform::identity();
    let empty_mask = MonoImage::filled(ROWS, COLS, 0);

    for _ in 0..5 {
        let depth = wall_with_box();
        human
            .integrate_depth_masked(&depth, &empty_mask, &pose, &pose, &camera(), &camera())
            .unwrap();
        reference
            .integrate_depth(&depth, &pose, &camera(), None)
            .unwrap();
    }

    let masked = human.masked_mapper().unwrap();
    assert!(masked.occupancy_layer().is_empty());
    assert!(masked.tsdf_layer().is_empty());
    assert_eq!(
        human.unmasked_mapper().tsdf_layer(),
        reference.unmasked_mapper().tsdf_layer()
    );
    assert!(human.last_depth_frame_mask_overlay().is_some());
}

#[test]
fn human_pixels_only_reach_the_masked_mapper() {
    let mut mm = build(MappingType::HumanWithStaticOccupancy);
    let pose = Transform::identity();
    let depth = wall_with_box();
    for _ in 0..3 {
        mm.integrate_depth_masked(&depth, &box_mask(), &pose, &pose, &camera(), &camera())
            .unwrap();
    }
    mm.integrate_color_masked(
        &ColorImage::filled(ROWS, COLS, Color::RED),
        &box_mask(),
        &pose,
        &camera(),
    )
    .unwrap();

    let at_box = global_voxel_index(&Point3::new(0.0, 0.0, BOX_DEPTH + 0.05), VOXEL_SIZE);
    let masked = mm.masked_mapper().unwrap();
    assert!(masked
        .occupancy_layer()
        .get_voxel_by_index(&at_box)
        .is_some_and(|v| v.is_occupied()));
    assert!(masked
        .color_layer()
        .iter_voxels()
        .any(|(_, v)| v.weight > 0.0 && v.color == Color::RED));

    let unmasked = mm.unmasked_mapper();
    assert!(!unmasked
        .occupancy_layer()
        .get_voxel_by_index(&at_box)
        .is_some_and(|v| v.is_occupied()));

    let unmasked_depth = mm.last_depth_frame_unmasked().unwrap();
    assert_eq!(unmasked_depth[(15, 20)], -1.0);
    assert_eq!(unmasked_depth[(0, 0)], WALL_DEPTH);
}
