use concurrentree::Operation;
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
use concurrentree::key::ReplicaId;
use proptest::prelude::*;
use serde_json::Value;
use serde_json::json;

// =============================================================================
// Edit scripts
// =============================================================================

/// Positions are percentages of the current length so any script is valid
/// against any state.
#[derive(Clone, Debug)]
enum Edit {
    Insert { at: u8, text: String },
    Delete { at: u8, len: u8 },
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0u8..=100, "[a-c]{1,4}").prop_map(|(at, text)| Edit::Insert { at, text }),
        (0u8..=100, 1u8..4).prop_map(|(at, len)| Edit::Delete { at, len }),
    ]
}

fn scaled(at: u8, len: usize) -> usize {
    return at as usize * len / 100;
}

fn run_text(tree: &mut Tree, script: &[Edit]) -> Vec<Operation> {
    let root = tree.root();
    let mut ops = Vec::new();
    for step in script {
        let len = tree.visible_len(root);
        let edit = match step {
            Edit::Insert { at, text } => StringEdit::insert(scaled(*at, len), text.clone()),
            Edit::Delete { at, len: count } => {
                if len == 0 {
                    continue;
                }
                let start = scaled(*at, len).min(len - 1);
                StringEdit::delete(start, (*count as usize).min(len - start))
            }
        };
        ops.push(StringContext::apply_live(tree, root, edit).unwrap());
    }
    return ops;
}

fn run_list(tree: &mut Tree, script: &[Edit]) -> Vec<Operation> {
    let root = tree.root();
    let mut ops = Vec::new();
    for step in script {
        let len = tree.visible_len(root);
        let edit = match step {
            Edit::Insert { at, text } => {
                let values = text.chars().map(|c| json!(c.to_string())).collect();
                ListEdit::insert(scaled(*at, len), values)
            }
            Edit::Delete { at, len: count } => {
                if len == 0 {
                    continue;
                }
                let start = scaled(*at, len).min(len - 1);
                ListEdit::delete(start, (*count as usize).min(len - start))
            }
        };
        ops.push(ListContext::apply_live(tree, root, edit).unwrap());
    }
    return ops;
}

fn apply_all(tree: &mut Tree, ops: &[Operation]) {
    let root = tree.root();
    for op in ops {
        assert!(op.ready(tree, root));
        op.apply(tree, root).unwrap();
    }
}

/// Run one script on each replica, then deliver each replica's operations
/// to the other. Returns both replicas and every operation issued.
fn exchange(
    base: &Value,
    run: fn(&mut Tree, &[Edit]) -> Vec<Operation>,
    left: &[Edit],
    right: &[Edit],
) -> (Tree, Tree, Vec<Operation>) {
    let mut a = Tree::new(base).unwrap();
    let mut b = Tree::new(base).unwrap();
    let from_a = run(&mut a, left);
    let from_b = run(&mut b, right);
    apply_all(&mut a, &from_b);
    apply_all(&mut b, &from_a);
    let mut all = from_a;
    all.extend(from_b);
    return (a, b, all);
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn text_replicas_converge(
        left in prop::collection::vec(edit(), 0..12),
        right in prop::collection::vec(edit(), 0..12),
    ) {
        let (a, b, _) = exchange(&json!("base"), run_text, &left, &right);
        prop_assert_eq!(a.flatten(a.root()), b.flatten(b.root()));
    }

    #[test]
    fn list_replicas_converge(
        left in prop::collection::vec(edit(), 0..12),
        right in prop::collection::vec(edit(), 0..12),
    ) {
        let (a, b, _) = exchange(&json!(["x", "y"]), run_list, &left, &right);
        prop_assert_eq!(a.flatten(a.root()), b.flatten(b.root()));
    }

    #[test]
    fn redelivery_changes_nothing(
        left in prop::collection::vec(edit(), 0..12),
        right in prop::collection::vec(edit(), 0..12),
    ) {
        let (mut a, _, all) = exchange(&json!("base"), run_text, &left, &right);
        let before = a.flatten(a.root());
        let size = a.size();
        apply_all(&mut a, &all);
        prop_assert_eq!(a.flatten(a.root()), before);
        prop_assert_eq!(a.size(), size);
    }

    #[test]
    fn deleted_text_stays_deleted(
        script in prop::collection::vec(edit(), 1..16),
    ) {
        let mut tree = Tree::new(&json!("abcdef")).unwrap();
        let root = tree.root();
        StringContext::apply_live(&mut tree, root, StringEdit::delete(0, 6)).unwrap();
        run_text(&mut tree, &script);
        let tombstones = tree.node(root).tombstones().unwrap();
        prop_assert_eq!(tombstones.deleted().count(), 6);
    }

    #[test]
    fn snapshots_round_trip(
        script in prop::collection::vec(edit(), 0..16),
    ) {
        let mut tree = Tree::new(&json!("base")).unwrap();
        run_text(&mut tree, &script);
        let copy = Tree::reconstruct(&tree.proto()).unwrap();
        prop_assert_eq!(copy.flatten(copy.root()), tree.flatten(tree.root()));
    }

    #[test]
    fn map_sets_converge(
        left in prop::collection::vec((0u8..3, 0i64..5), 0..8),
        right in prop::collection::vec((0u8..3, 0i64..5), 0..8),
    ) {
        let run = |tree: &mut Tree, sets: &[(u8, i64)]| -> Vec<Operation> {
            let root = tree.root();
            return sets
                .iter()
                .map(|(field, value)| {
                    let edit = MapEdit::set(format!("f{}", field), json!(value));
                    return MapContext::apply_live(tree, root, edit).unwrap();
                })
                .collect();
        };
        let mut a = Tree::new(&json!({})).unwrap();
        let mut b = Tree::new(&json!({})).unwrap();
        let from_a = run(&mut a, &left[..]);
        let from_b = run(&mut b, &right[..]);
        apply_all(&mut a, &from_b);
        apply_all(&mut b, &from_a);
        prop_assert_eq!(a.flatten(a.root()), b.flatten(b.root()));
    }

    #[test]
    fn counters_sum_in_any_order(
        amounts in prop::collection::vec(-50i64..50, 0..10),
    ) {
        let base = Tree::new(&json!(7)).unwrap();
        let root = base.root();
        let ops: Vec<Operation> = amounts
            .iter()
            .enumerate()
            .map(|(seq, amount)| {
                let delta = Delta::new(*amount, ReplicaId::from_u128(seq as u128), 1);
                return NumberContext::compute(&base, root, delta).unwrap();
            })
            .collect();
        let mut forward = base.clone();
        apply_all(&mut forward, &ops);
        let mut backward = base.clone();
        let reversed: Vec<Operation> = ops.iter().rev().cloned().collect();
        apply_all(&mut backward, &reversed);
        let expected = 7 + amounts.iter().sum::<i64>();
        prop_assert_eq!(forward.flatten(root), json!(expected));
        prop_assert_eq!(backward.flatten(root), json!(expected));
    }
}
