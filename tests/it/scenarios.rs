use concurrentree::Address;
use concurrentree::Error;
use concurrentree::Slot;
use concurrentree::Tree;
use concurrentree::context::Context;
use concurrentree::context::Delta;
use concurrentree::context::ListContext;
use concurrentree::context::ListEdit;
use concurrentree::context::MapContext;
use concurrentree::context::MapEdit;
use concurrentree::context::NumberContext;
use concurrentree::context::StringContext;
use concurrentree::context::StringEdit;
use concurrentree::crdt::Instruction;
use concurrentree::key::ReplicaId;
use serde_json::json;

#[test]
fn grey_cat() {
    let mut tree = Tree::new(&json!("grey")).unwrap();
    let root = tree.root();
    let steps = [
        (StringEdit::insert(4, " cat."), "grey cat."),
        (StringEdit::delete(0, 1), "rey cat."),
        (StringEdit::delete(7, 1), "rey cat"),
        (StringEdit::insert(0, "G"), "Grey cat"),
        (StringEdit::insert(8, "!"), "Grey cat!"),
    ];
    for (edit, expected) in steps {
        StringContext::apply_live(&mut tree, root, edit).unwrap();
        assert_eq!(tree.flatten(root), json!(expected));
    }
}

#[test]
fn hello_world_wide_web() {
    let mut tree = Tree::new(&json!(["Hello"])).unwrap();
    let root = tree.root();
    let steps = [
        (ListEdit::insert(1, vec![json!("world")]), json!(["Hello", "world"])),
        (ListEdit::delete(0, 1), json!(["world"])),
        (
            ListEdit::insert(1, vec![json!("wide"), json!("web")]),
            json!(["world", "wide", "web"]),
        ),
        (ListEdit::delete(0, 2), json!(["web"])),
    ];
    for (edit, expected) in steps {
        ListContext::apply_live(&mut tree, root, edit).unwrap();
        assert_eq!(tree.flatten(root), expected);
    }
}

#[test]
fn concurrent_inserts_at_one_position() {
    let base = Tree::new(&json!("grey")).unwrap();
    let root = base.root();
    let a = StringContext::compute(&base, root, StringEdit::insert(4, "A")).unwrap();
    let b = StringContext::compute(&base, root, StringEdit::insert(4, "B")).unwrap();

    let mut left = base.clone();
    a.apply(&mut left, root).unwrap();
    b.apply(&mut left, root).unwrap();
    let mut right = base.clone();
    b.apply(&mut right, root).unwrap();
    a.apply(&mut right, root).unwrap();

    let slot = left.node(root).slot(&Slot::Index(4)).unwrap();
    assert_eq!(slot.len(), 2);
    assert_eq!(left.flatten(root), right.flatten(root));
    let text = left.flatten(root);
    assert!(text == json!("greyAB") || text == json!("greyBA"));
}

#[test]
fn counter_from_two_replicas() {
    let base = Tree::new(&json!(10)).unwrap();
    let root = base.root();
    let (alice, bob) = (ReplicaId::from_u128(1), ReplicaId::from_u128(2));
    let u1 = NumberContext::compute(&base, root, Delta::new(3, alice, 1)).unwrap();
    let u2 = NumberContext::compute(&base, root, Delta::new(-1, bob, 1)).unwrap();

    for order in [[&u1, &u2], [&u2, &u1]] {
        let mut tree = base.clone();
        for op in order {
            op.apply(&mut tree, root).unwrap();
        }
        assert_eq!(tree.flatten(root), json!(12));
    }
}

#[test]
fn overwritten_field_keeps_history() {
    let mut tree = Tree::new(&json!({})).unwrap();
    let root = tree.root();
    MapContext::apply_live(&mut tree, root, MapEdit::set("x", json!(1))).unwrap();
    let before = tree.size();
    MapContext::apply_live(&mut tree, root, MapEdit::set("x", json!(2))).unwrap();
    assert_eq!(tree.flatten(root), json!({"x": 2}));
    // A new link and its value were added; nothing was replaced.
    assert_eq!(tree.size(), before + 2);
}

#[test]
fn bad_deletes_touch_nothing() {
    let mut tree = Tree::new(&json!("hello")).unwrap();
    let root = tree.root();

    let err = StringContext::apply_live(&mut tree, root, StringEdit::delete(100, 1)).unwrap_err();
    assert!(matches!(err, Error::IndexOutOfRange { .. }));
    assert_eq!(tree.flatten(root), json!("hello"));

    let inverted = Instruction::delete(Address::root(), vec![(5, 2)]);
    assert!(matches!(
        inverted.sanitycheck(&tree, root),
        Err(Error::InvalidRange { start: 5, end: 2 })
    ));
    assert!(inverted.apply(&mut tree, root, true).is_err());
    assert_eq!(tree.flatten(root), json!("hello"));
}

#[test]
fn failed_operation_rolls_back() {
    let mut tree = Tree::new(&json!("hello")).unwrap();
    let root = tree.root();
    let good = StringContext::compute(&tree, root, StringEdit::insert(5, " world")).unwrap();
    let mut op = good.clone();
    op.push(Instruction::delete(Address::root(), vec![(40, 40)]));

    let err = op.apply(&mut tree, root).unwrap_err();
    assert!(matches!(err, Error::OpApply(_)));
    assert_eq!(tree.flatten(root), json!("hello"));
    assert_eq!(tree.size(), 1);

    good.apply(&mut tree, root).unwrap();
    assert_eq!(tree.flatten(root), json!("hello world"));
}

#[test]
fn long_note_typed_one_key_at_a_time() {
    let start = json!({"note": ""});
    let mut alice = concurrentree::Document::new(ReplicaId::from_u128(1), &start).unwrap();
    let mut bob = concurrentree::Document::new(ReplicaId::from_u128(2), &start).unwrap();

    let mut typed = String::new();
    for step in 0..2_000u32 {
        let key = char::from(b'a' + (step % 26) as u8);
        let mut root = alice.root();
        root.field("note").unwrap().unwrap().push_str(&key.to_string()).unwrap();
        typed.push(key);
    }
    for op in alice.drain_outbox() {
        bob.receive(&op).unwrap();
    }
    assert_eq!(alice.value(), json!({"note": typed}));
    assert_eq!(bob.value(), alice.value());
}
