use concurrentree::Address;
use concurrentree::Error;
use concurrentree::Hop;
use concurrentree::Instruction;
use concurrentree::Operation;
use concurrentree::Tree;
use concurrentree::context::Context;
use concurrentree::context::MapContext;
use concurrentree::context::MapEdit;
use concurrentree::context::StringContext;
use concurrentree::context::StringEdit;
use serde_json::json;

#[test]
fn operation_survives_a_json_string() {
    let mut sender = Tree::new(&json!({"body": "grey"})).unwrap();
    let mut receiver = sender.clone();
    let root = sender.root();

    let body = MapContext::value(&sender, root, "body").unwrap().unwrap();
    let edit = StringContext::compute(&sender, body.1, StringEdit::insert(4, " cat")).unwrap();
    let op = body.0 + edit;
    op.apply(&mut sender, root).unwrap();

    let text = serde_json::to_string(&op).unwrap();
    let decoded: Operation = serde_json::from_str(&text).unwrap();
    assert_eq!(decoded, op);
    assert_eq!(decoded.proto()["type"], json!("op"));

    decoded.apply(&mut receiver, root).unwrap();
    assert_eq!(receiver.flatten(root), json!({"body": "grey cat"}));
}

#[test]
fn documented_number_insert() {
    let value = json!([4, [2, "ab3"], 0, 7, 19823]);
    let instruction = Instruction::from_proto(&value).unwrap();
    assert_eq!(instruction.code(), 4);
    assert_eq!(instruction.proto(), value);
    assert_eq!(serde_json::to_value(&instruction).unwrap(), value);
    assert_eq!(
        instruction.address(),
        &Address::from_hops([Hop::Child {
            position: 2,
            key: concurrentree::Key::new("ab3").unwrap(),
        }])
    );
}

#[test]
fn malformed_addresses() {
    for bad in [json!([1, 2, "k"]), json!(["k", 3]), json!([true]), json!([1, ""])] {
        let err = Address::from_proto(&bad).unwrap_err();
        assert!(matches!(err, Error::MalformedAddress(_)), "{} gave {:?}", bad, err);
    }
    let ok = Address::from_proto(&json!(["field", 1, "k", 0, "j"])).unwrap();
    assert_eq!(ok.len(), 3);
    assert_eq!(ok.proto(), json!(["field", 1, "k", 0, "j"]));
}

#[test]
fn tree_snapshot_rebuilds_the_same_tree() {
    let mut tree = Tree::new(&json!({"a": [1, {"b": null}], "c": "text"})).unwrap();
    let root = tree.root();
    MapContext::apply_live(&mut tree, root, MapEdit::set("a", json!(false))).unwrap();
    MapContext::apply_live(&mut tree, root, MapEdit::remove("c")).unwrap();

    let text = serde_json::to_string(&tree.proto()).unwrap();
    let copy = Tree::reconstruct(&serde_json::from_str(&text).unwrap()).unwrap();
    assert_eq!(copy.flatten(copy.root()), tree.flatten(root));
    assert_eq!(copy.size(), tree.size());
}

#[test]
fn snapshot_seeds_a_new_replica() {
    let mut origin = Tree::new(&json!(["x"])).unwrap();
    let root = origin.root();
    let seed = Operation::from_children(&origin, root);
    let mut fresh = Tree::new(&json!(["x"])).unwrap();
    let fresh_root = fresh.root();
    seed.apply(&mut fresh, fresh_root).unwrap();
    assert_eq!(fresh.flatten(fresh_root), origin.flatten(root));

    // Merging is idempotent and only ever adds.
    origin.merge(&fresh).unwrap();
    origin.merge(&fresh).unwrap();
    assert_eq!(origin.flatten(root), json!(["x"]));

    let other = Tree::new(&json!("not a list")).unwrap();
    assert!(matches!(origin.merge(&other), Err(Error::RootMismatch { .. })));
}
