//! Property-based invariant tests for hmodel-region.
//!
//! Random sequences of tree edits and change brackets must preserve:
//!
//! 1. Sibling names are unique.
//! 2. No region is its own ancestor.
//! 3. Change levels return to zero once every bracket the test opened is
//!    closed, wherever the regions were moved in between.
//! 4. Path lookup of any region's own path finds that region, repeatedly.
//! 5. While a hierarchical change is open on a tree, no region inside that
//!    tree is notified, however regions are created, moved, removed or
//!    renamed in between.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use hmodel_region::{RegionId, RegionTree};
use proptest::prelude::*;

const NAMES: [&str; 4] = ["a", "b", "c", "d"];

#[derive(Debug, Clone)]
enum Op {
    Create { parent: usize, name: usize },
    Move { child: usize, parent: usize },
    Remove { child: usize },
    Rename { region: usize, name: usize },
    Begin { region: usize },
    End { region: usize },
    BeginHierarchical { region: usize },
    EndHierarchical { region: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0usize..32, 0usize..NAMES.len()).prop_map(|(parent, name)| Op::Create { parent, name }),
        2 => (0usize..32, 0usize..32).prop_map(|(child, parent)| Op::Move { child, parent }),
        1 => (0usize..32).prop_map(|child| Op::Remove { child }),
        1 => (0usize..32, 0usize..NAMES.len()).prop_map(|(region, name)| Op::Rename { region, name }),
        1 => (0usize..32).prop_map(|region| Op::Begin { region }),
        1 => (0usize..32).prop_map(|region| Op::End { region }),
        1 => (0usize..32).prop_map(|region| Op::BeginHierarchical { region }),
        1 => (0usize..32).prop_map(|region| Op::EndHierarchical { region }),
    ]
}

/// Edits only, no change brackets.
fn structural_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0usize..32, 0usize..NAMES.len()).prop_map(|(parent, name)| Op::Create { parent, name }),
        3 => (0usize..32, 0usize..32).prop_map(|(child, parent)| Op::Move { child, parent }),
        1 => (0usize..32).prop_map(|child| Op::Remove { child }),
        2 => (0usize..32, 0usize..NAMES.len()).prop_map(|(region, name)| Op::Rename { region, name }),
    ]
}

struct Harness {
    tree: RegionTree,
    regions: Vec<RegionId>,
    opened: BTreeMap<RegionId, u32>,
    opened_hierarchical: BTreeMap<RegionId, u32>,
}

impl Harness {
    fn new() -> Self {
        let mut tree = RegionTree::default();
        let root = tree.create_root().unwrap();
        Self {
            tree,
            regions: vec![root],
            opened: BTreeMap::new(),
            opened_hierarchical: BTreeMap::new(),
        }
    }

    fn pick(&self, index: usize) -> RegionId {
        self.regions[index % self.regions.len()]
    }

    fn apply(&mut self, op: &Op) {
        match *op {
            Op::Create { parent, name } => {
                let parent = self.pick(parent);
                if let Ok(child) = self.tree.create_child(parent, NAMES[name]) {
                    self.regions.push(child);
                }
            }
            Op::Move { child, parent } => {
                let child = self.pick(child);
                let parent = self.pick(parent);
                let before = self.tree.parent(child).unwrap();
                if self.tree.insert_child_before(parent, child, None).is_err() {
                    assert_eq!(self.tree.parent(child).unwrap(), before);
                }
            }
            Op::Remove { child } => {
                let child = self.pick(child);
                if let Some(parent) = self.tree.parent(child).unwrap() {
                    self.tree.remove_child(parent, child).unwrap();
                }
            }
            Op::Rename { region, name } => {
                let region = self.pick(region);
                let _ = self.tree.set_name(region, NAMES[name]);
            }
            Op::Begin { region } => {
                let region = self.pick(region);
                self.tree.begin_change(region).unwrap();
                *self.opened.entry(region).or_default() += 1;
            }
            Op::End { region } => {
                let region = self.pick(region);
                let open = self.opened.entry(region).or_default();
                if *open > 0 {
                    *open -= 1;
                    self.tree.end_change(region).unwrap();
                } else if self.tree.change_level(region).unwrap() == 0 {
                    assert!(self.tree.end_change(region).is_err());
                    assert_eq!(self.tree.change_level(region).unwrap(), 0);
                }
            }
            Op::BeginHierarchical { region } => {
                let region = self.pick(region);
                self.tree.begin_hierarchical_change(region).unwrap();
                *self.opened_hierarchical.entry(region).or_default() += 1;
            }
            Op::EndHierarchical { region } => {
                let region = self.pick(region);
                let open = self.opened_hierarchical.entry(region).or_default();
                if *open > 0 {
                    *open -= 1;
                    self.tree.end_hierarchical_change(region).unwrap();
                } else {
                    assert!(self.tree.end_hierarchical_change(region).is_err());
                }
            }
        }
    }

    fn check_structure(&self) {
        for region in &self.regions {
            let children = self.tree.children(*region).unwrap();
            let mut names = HashSet::new();
            for child in children {
                let name = self.tree.name(*child).unwrap().expect("children are named");
                assert!(names.insert(name), "duplicate sibling name {name}");
                assert_eq!(self.tree.parent(*child).unwrap(), Some(*region));
            }
            let mut steps = 0;
            let mut current = self.tree.parent(*region).unwrap();
            while let Some(ancestor) = current {
                assert_ne!(ancestor, *region, "region is its own ancestor");
                steps += 1;
                assert!(steps <= self.regions.len());
                current = self.tree.parent(ancestor).unwrap();
            }
        }
    }

    fn check_paths(&self) {
        for region in &self.regions {
            let top = self.tree.root_of(*region).unwrap();
            let path = self.tree.get_path(*region).unwrap();
            let first = self.tree.find_subregion_at_path(top, &path);
            let second = self.tree.find_subregion_at_path(top, &path);
            assert_eq!(first, Some(*region));
            assert_eq!(first, second);
        }
    }

    fn close_everything(&mut self) {
        for (region, count) in std::mem::take(&mut self.opened) {
            for _ in 0..count {
                self.tree.end_change(region).unwrap();
            }
        }
        for (region, count) in std::mem::take(&mut self.opened_hierarchical) {
            for _ in 0..count {
                self.tree.end_hierarchical_change(region).unwrap();
            }
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

/// Record `region` whenever it is notified while it belongs to the tree
/// whose top-level region is stored in `window`.
fn watch_window(
    tree: &mut RegionTree,
    region: RegionId,
    window: &Rc<Cell<Option<RegionId>>>,
    early: &Rc<RefCell<Vec<RegionId>>>,
) {
    let window = Rc::clone(window);
    let early = Rc::clone(early);
    tree.add_callback(region, move |tree, changes| {
        if let Some(top) = window.get()
            && tree.root_of(changes.region).ok() == Some(top)
        {
            early.borrow_mut().push(changes.region);
        }
    })
    .unwrap();
}

// ── Invariants ──────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn structure_holds_after_any_edit_sequence(ops in prop::collection::vec(op(), 1..80)) {
        let mut harness = Harness::new();
        for op in &ops {
            harness.apply(op);
            harness.check_structure();
        }
        harness.check_paths();
    }

    #[test]
    fn change_levels_balance(ops in prop::collection::vec(op(), 1..80)) {
        let mut harness = Harness::new();
        for op in &ops {
            harness.apply(op);
        }
        harness.close_everything();
        for region in &harness.regions {
            prop_assert_eq!(harness.tree.change_level(*region).unwrap(), 0);
            prop_assert_eq!(harness.tree.hierarchical_change_level(*region).unwrap(), 0);
        }
    }

    #[test]
    fn many_additions_in_one_window_notify_once(count in 2usize..12) {
        let mut tree = RegionTree::default();
        let root = tree.create_root().unwrap();
        let calls = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = std::rc::Rc::clone(&calls);
        tree.add_callback(root, move |_, changes| sink.borrow_mut().push(changes.clone()))
            .unwrap();
        tree.begin_change(root).unwrap();
        for index in 0..count {
            tree.create_child(root, &format!("child{index}")).unwrap();
        }
        tree.end_change(root).unwrap();
        let calls = calls.borrow();
        prop_assert_eq!(calls.len(), 1);
        prop_assert_eq!(&calls[0].children, &hmodel_region::ChildChange::Multiple);
    }

    #[test]
    fn open_hierarchical_window_defers_every_notification(
        setup in prop::collection::vec(structural_op(), 0..20),
        ops in prop::collection::vec(structural_op(), 1..60),
    ) {
        let mut harness = Harness::new();
        for op in &setup {
            harness.apply(op);
        }
        let other = harness.tree.create_root().unwrap();
        harness.regions.push(other);

        let root = harness.regions[0];
        let window = Rc::new(Cell::new(None));
        let early = Rc::new(RefCell::new(Vec::new()));
        for region in harness.regions.clone() {
            watch_window(&mut harness.tree, region, &window, &early);
        }

        window.set(Some(root));
        harness.tree.begin_hierarchical_change(root).unwrap();
        for op in &ops {
            let known = harness.regions.len();
            harness.apply(op);
            for region in harness.regions[known..].to_vec() {
                watch_window(&mut harness.tree, region, &window, &early);
            }
        }
        window.set(None);
        harness.tree.end_hierarchical_change(root).unwrap();

        prop_assert!(early.borrow().is_empty(), "notified inside window: {:?}", early.borrow());
        for region in &harness.regions {
            prop_assert_eq!(harness.tree.change_level(*region).unwrap(), 0);
        }
    }
}
