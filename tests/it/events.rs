use concurrentree::Address;
use concurrentree::Instruction;
use concurrentree::Tree;
use concurrentree::context::Context;
use concurrentree::context::MapContext;
use concurrentree::context::MapEdit;
use concurrentree::context::StringContext;
use concurrentree::context::StringEdit;
use concurrentree::crdt::event::Event;
use concurrentree::crdt::event::Label;
use concurrentree::crdt::event::ObserverId;
use serde_json::json;

const WATCHER: ObserverId = ObserverId(1);

#[test]
fn committed_edits_are_announced() {
    let mut tree = Tree::new(&json!({"title": "grey"})).unwrap();
    let root = tree.root();
    tree.events_mut().register(Label::Delete, WATCHER);
    tree.events_mut().register(Label::ChildDelete, WATCHER);

    let (_, text) = MapContext::value(&tree, root, "title").unwrap().unwrap();
    StringContext::apply_live(&mut tree, text, StringEdit::delete(0, 1)).unwrap();

    let mail = tree.events_mut().take(WATCHER);
    assert_eq!(mail[0], Event::Delete { node: text, position: 0 });
    // title value -> single -> map root
    let ancestors: Vec<_> = mail
        .iter()
        .filter(|event| event.label() == Label::ChildDelete)
        .collect();
    assert_eq!(ancestors.len(), 2);
    assert!(tree.events_mut().take(WATCHER).is_empty());
}

#[test]
fn rolled_back_edits_are_not_announced() {
    let mut tree = Tree::new(&json!("grey")).unwrap();
    let root = tree.root();
    tree.events_mut().register(Label::Insert, WATCHER);

    let mut op = StringContext::compute(&tree, root, StringEdit::insert(4, " cat")).unwrap();
    op.push(Instruction::delete(Address::root(), vec![(99, 99)]));
    assert!(op.apply(&mut tree, root).is_err());
    assert!(tree.events_mut().take(WATCHER).is_empty());

    MapContext::compute(&tree, root, MapEdit::set("x", json!(1))).unwrap_err();
    StringContext::apply_live(&mut tree, root, StringEdit::insert(4, " cat")).unwrap();
    assert_eq!(tree.events_mut().take(WATCHER).len(), 1);
}

#[test]
fn unregistered_observers_get_nothing() {
    let mut tree = Tree::new(&json!("grey")).unwrap();
    let root = tree.root();
    tree.events_mut().register(Label::Insert, WATCHER);
    tree.events_mut().unregister(WATCHER);
    StringContext::apply_live(&mut tree, root, StringEdit::insert(0, ">")).unwrap();
    assert!(tree.events_mut().take(WATCHER).is_empty());
}
