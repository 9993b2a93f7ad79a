//! Property-based tests for lifecycle ordering and arbitrary module graphs

mod helpers;

use helpers::{create_test_loader, key, GraphHooks};
use module_loader::loader::ModuleState;
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap, VecDeque};

fn module_state() -> impl Strategy<Value = ModuleState> {
    prop_oneof![
        Just(ModuleState::Fetch),
        Just(ModuleState::Instantiate),
        Just(ModuleState::Satisfy),
        Just(ModuleState::Link),
        Just(ModuleState::Ready),
    ]
}

/// Module count and edges between module indices; cycles and self imports included.
fn module_graph() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..8).prop_flat_map(|count| {
        (
            Just(count),
            prop::collection::vec((0..count, 0..count), 0..count * 3),
        )
    })
}

fn reachable_from_root(deps: &HashMap<String, Vec<String>>) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from(["m0".to_string()]);
    while let Some(name) = queue.pop_front() {
        if seen.insert(name.clone()) {
            queue.extend(deps[&name].iter().cloned());
        }
    }
    seen
}

proptest! {
    #[test]
    fn test_state_never_moves_backwards(targets in prop::collection::vec(module_state(), 1..20)) {
        let mut state = ModuleState::Fetch;
        let mut highest = ModuleState::Fetch;

        for target in targets {
            let raised = state.raise_to(target);
            prop_assert_eq!(raised, target > highest);
            highest = highest.max(target);
            prop_assert_eq!(state, highest);
        }
    }

    #[test]
    fn test_any_graph_evaluates_each_reachable_module_once((count, edges) in module_graph()) {
        let mut deps: HashMap<String, Vec<String>> =
            (0..count).map(|index| (format!("m{index}"), Vec::new())).collect();
        for (from, to) in edges {
            let targets = deps.get_mut(&format!("m{from}")).unwrap();
            let target = format!("m{to}");
            if !targets.contains(&target) {
                targets.push(target);
            }
        }

        let hooks = GraphHooks::new();
        for (name, targets) in &deps {
            let targets: Vec<&str> = targets.iter().map(String::as_str).collect();
            hooks.add_module(name, &targets);
        }
        let (loader, hooks) = create_test_loader(hooks);

        tokio_test::block_on(loader.load_and_evaluate_module("m0", None, ())).unwrap();

        let reachable = reachable_from_root(&deps);
        let evaluations = hooks.evaluations();
        let evaluated: BTreeSet<String> = evaluations.iter().cloned().collect();

        prop_assert_eq!(evaluations.len(), evaluated.len());
        prop_assert_eq!(&evaluated, &reachable);
        prop_assert_eq!(evaluations.last().map(String::as_str), Some("m0"));
        for name in &reachable {
            prop_assert_eq!(hooks.parse_count(name), 1);
            prop_assert_eq!(hooks.link_count(name), 1);
            prop_assert_eq!(loader.state(&key(name)), Some(ModuleState::Ready));
        }
        prop_assert_eq!(loader.with_registry(|registry| registry.len()), reachable.len());
    }
}
