//! Writing region trees to streams and reading them back.

use hmodel_fields::{FieldDefinition, ValueType};
use hmodel_region::{
    FileStream, MemoryStream, RegionError, RegionId, RegionTree, StreamError, StreamResource,
};

fn sample(tree: &mut RegionTree) -> RegionId {
    let root = tree.create_root().unwrap();
    let heart = tree.create_children_from_path(root, "body/heart").unwrap();
    tree.edit_fields(heart, |manager, domain| {
        manager
            .define_field(FieldDefinition::new("coordinates", ValueType::Real, 3))
            .unwrap();
        for id in 1..=4 {
            domain.add_node(id).unwrap();
        }
        domain.add_element(1, "tetrahedron").unwrap();
    })
    .unwrap();
    let wall = tree.create_group(heart, "wall").unwrap();
    tree.edit_fields(wall, |_, domain| {
        domain.add_node(2).unwrap();
        domain.add_element(1, "").unwrap();
    })
    .unwrap();
    root
}

#[test]
fn file_round_trip_rebuilds_subtree() {
    let dir = tempfile::tempdir().unwrap();
    let mut stream = FileStream::new(dir.path().join("model.json"));

    let mut tree = RegionTree::default();
    let root = sample(&mut tree);
    tree.write(root, &mut stream).unwrap();

    let target = tree.create_root().unwrap();
    tree.read(target, &mut stream).unwrap();

    let heart = tree.find_subregion_at_path(target, "body/heart").unwrap();
    let fields = tree.fields(heart).unwrap().unwrap();
    assert_eq!(
        fields.borrow().manager().find_field("coordinates"),
        Some(&FieldDefinition::new("coordinates", ValueType::Real, 3))
    );
    let domain = tree.domain(heart).unwrap().unwrap();
    assert_eq!(domain.borrow().node_ids(), vec![1, 2, 3, 4]);
    assert_eq!(
        domain.borrow().element_shape(1).as_deref(),
        Some("tetrahedron")
    );
    let wall = tree.find_subregion_at_path(target, "body/heart/wall").unwrap();
    assert!(tree.is_group(wall).unwrap());
    assert_eq!(
        tree.domain(wall).unwrap().unwrap().borrow().node_ids(),
        vec![2]
    );
    assert_eq!(tree.snapshot(target).unwrap(), tree.snapshot(root).unwrap());
}

#[test]
fn reading_merges_into_existing_regions() {
    let mut tree = RegionTree::default();
    let root = sample(&mut tree);
    let mut stream = MemoryStream::new();
    tree.write(root, &mut stream).unwrap();

    let target = tree.create_root().unwrap();
    let body = tree.create_child(target, "body").unwrap();
    let lungs = tree.create_child(body, "lungs").unwrap();
    tree.read(target, &mut stream).unwrap();

    assert_eq!(tree.find_subregion_at_path(target, "body"), Some(body));
    assert_eq!(tree.find_subregion_at_path(target, "body/lungs"), Some(lungs));
    assert!(tree.find_subregion_at_path(target, "body/heart").is_some());
    assert_eq!(tree.change_level(target).unwrap(), 0);
}

#[test]
fn incompatible_snapshot_is_rejected() {
    let mut tree = RegionTree::default();
    let root = sample(&mut tree);
    let mut stream = MemoryStream::new();
    tree.write(root, &mut stream).unwrap();

    let target = tree.create_root().unwrap();
    let heart = tree.create_children_from_path(target, "body/heart").unwrap();
    tree.edit_fields(heart, |manager, _| {
        manager.define_field(FieldDefinition::new("coordinates", ValueType::Real, 2))
    })
    .unwrap()
    .unwrap();
    let regions = tree.len();
    assert!(matches!(
        tree.read(target, &mut stream),
        Err(RegionError::MergeConflict { .. })
    ));
    assert_eq!(tree.len(), regions);
    assert!(tree.find_subregion_at_path(target, "body/heart/wall").is_none());
}

#[test]
fn missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let mut stream = FileStream::new(&path);
    match stream.read_snapshot() {
        Err(StreamError::Io { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected io error, got {other:?}"),
    }
    let mut tree = RegionTree::default();
    let root = tree.create_root().unwrap();
    assert!(matches!(
        tree.read(root, &mut stream),
        Err(RegionError::Stream(StreamError::Io { .. }))
    ));
}

#[test]
fn written_json_is_readable_by_serde() {
    let mut tree = RegionTree::default();
    let root = sample(&mut tree);
    let mut stream = MemoryStream::new();
    tree.write(root, &mut stream).unwrap();
    let value: serde_json::Value = serde_json::from_str(stream.as_json().unwrap()).unwrap();
    assert_eq!(value["children"][0]["name"], "body");
    assert_eq!(value["children"][0]["children"][0]["groups"][0]["name"], "wall");
}
