//! Facade smoke tests: the prelude is enough to build, edit and persist a
//! tree.

use hmodel::prelude::*;
use hmodel::{FileStream, MemoryStream};

#[test]
fn prelude_covers_common_workflow() -> Result<()> {
    let mut tree = RegionTree::new(TreeConfig::default());
    let root = tree.create_root()?;
    let organ = tree.create_subregion_at_path(root, "organs/liver")?;
    tree.edit_fields(organ, |manager, domain| {
        manager.define_field(FieldDefinition::new("density", ValueType::Real, 1))?;
        domain.add_node(1)
    })??;
    assert_eq!(tree.get_path(organ)?, "organs/liver");

    let mut stream = MemoryStream::new();
    tree.write(root, &mut stream)?;
    let copy = tree.create_root()?;
    tree.read(copy, &mut stream)?;
    assert!(tree.find_subregion_at_path(copy, "organs/liver").is_some());
    Ok(())
}

#[test]
fn errors_convert_into_facade_error() {
    let mut tree = RegionTree::default();
    let root = tree.create_root().unwrap();
    let err: Error = tree.end_change(root).unwrap_err().into();
    assert!(matches!(err, Error::Region(_)));
    assert!(err.to_string().contains("without matching begin_change"));
}

#[test]
fn file_stream_is_reachable_from_facade() -> Result<()> {
    let dir = tempfile::tempdir().map_err(|err| {
        Error::from(hmodel::StreamError::Io {
            path: std::env::temp_dir(),
            source: err,
        })
    })?;
    let mut tree = RegionTree::default();
    let root = tree.create_root()?;
    tree.create_child(root, "only")?;
    let mut stream = FileStream::new(dir.path().join("tree.json"));
    tree.write(root, &mut stream)?;
    let copy = tree.create_root()?;
    tree.read(copy, &mut stream)?;
    assert_eq!(tree.child_count(copy)?, 1);
    Ok(())
}
