//! Shared store fixtures for scenarios and tests.

use shopflow_core::{
    AnchorDef, AnchorId, SpaceMetadataDef, StoreConfig, StoreModel, TransitionCount, ZoneDef,
    ZoneId, ZoneKind,
};

fn rect(x0: f64, z0: f64, x1: f64, z1: f64) -> Vec<[f64; 2]> {
    vec![[x0, z0], [x1, z0], [x1, z1], [x0, z1]]
}

fn count(from: u32, to: u32, count: u64) -> TransitionCount {
    TransitionCount {
        from: ZoneId(from),
        to: ZoneId(to),
        count,
    }
}

/// The demo store: a 24 m x 12 m floor with an entrance on the west wall,
/// two aisles, a promo bay nested inside aisle A, checkout and service
/// desks, and an exit corridor on the east wall.
///
/// ```text
///   z=12 ┌────┬───────────────┬──────────────┬────┐
///        │    │    aisle B    │   service    │    │
///        │ en │               │              │ ex │
///    z=6 │ tr ├───────────────┼──────────────┤ it │
///        │    │  aisle A      │   checkout   │    │
///        │    │    ┌────┐     │              │    │
///        │    │    │bay │     │              │    │
///    z=0 └────┴────┴────┴─────┴──────────────┴────┘
///       x=0  x=4  x=8 x=10   x=12           x=20  x=24
/// ```
///
/// The model frame maps the floor onto the unit square, which is what a
/// dashboard canvas expects. Zone 7 (exit) deliberately has no recorded
/// transitions, exercising the uniform-over-adjacent fallback.
pub fn demo_store() -> StoreConfig {
    StoreConfig {
        space: SpaceMetadataDef {
            origin_x: 0.0,
            origin_z: 0.0,
            scale_x: 1.0 / 24.0,
            scale_z: 1.0 / 12.0,
            rotation: 0.0,
        },
        zones: vec![
            ZoneDef {
                id: ZoneId(1),
                name: "entrance".into(),
                kind: ZoneKind::Entrance,
                boundary: rect(0.0, 0.0, 4.0, 12.0),
            },
            ZoneDef {
                id: ZoneId(2),
                name: "aisle-a".into(),
                kind: ZoneKind::Aisle,
                boundary: rect(4.0, 0.0, 12.0, 6.0),
            },
            ZoneDef {
                id: ZoneId(3),
                name: "aisle-b".into(),
                kind: ZoneKind::Aisle,
                boundary: rect(4.0, 6.0, 12.0, 12.0),
            },
            ZoneDef {
                id: ZoneId(4),
                name: "promo-bay".into(),
                kind: ZoneKind::Service,
                boundary: rect(8.0, 2.0, 10.0, 4.0),
            },
            ZoneDef {
                id: ZoneId(5),
                name: "checkout".into(),
                kind: ZoneKind::Checkout,
                boundary: rect(12.0, 0.0, 20.0, 6.0),
            },
            ZoneDef {
                id: ZoneId(6),
                name: "service-desk".into(),
                kind: ZoneKind::Service,
                boundary: rect(12.0, 6.0, 20.0, 12.0),
            },
            ZoneDef {
                id: ZoneId(7),
                name: "exit".into(),
                kind: ZoneKind::Exit,
                boundary: rect(20.0, 0.0, 24.0, 12.0),
            },
        ],
        anchors: vec![
            AnchorDef {
                id: AnchorId(0),
                x: 0.0,
                z: 0.0,
            },
            AnchorDef {
                id: AnchorId(1),
                x: 24.0,
                z: 0.0,
            },
            AnchorDef {
                id: AnchorId(2),
                x: 0.0,
                z: 12.0,
            },
            AnchorDef {
                id: AnchorId(3),
                x: 24.0,
                z: 12.0,
            },
            AnchorDef {
                id: AnchorId(4),
                x: 12.0,
                z: 6.0,
            },
        ],
        transitions: vec![
            count(1, 2, 60),
            count(1, 3, 40),
            count(2, 3, 25),
            count(2, 4, 20),
            count(2, 5, 45),
            count(2, 1, 10),
            count(3, 2, 30),
            count(3, 6, 20),
            count(3, 5, 40),
            count(3, 1, 10),
            count(4, 2, 90),
            count(4, 5, 10),
            count(5, 7, 80),
            count(5, 2, 10),
            count(5, 6, 10),
            count(6, 3, 50),
            count(6, 7, 30),
            count(6, 5, 20),
        ],
    }
}

/// Builds the validated model for [`demo_store`].
pub fn demo_store_model() -> StoreModel {
    StoreModel::from_config(&demo_store()).expect("demo store config is valid")
}
