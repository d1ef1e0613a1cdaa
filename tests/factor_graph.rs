//! Factor-graph scenarios exercised through the public API.

use qproj::{
    bdd::{Bdd, BddManager},
    fgraph::FactorGraph,
};

/// x·y and x·¬y·z contradict each other; message passing on the factor
/// graph discovers this and the converged messages on the non-x variables
/// collapse to the exact (empty) projection.
#[test]
fn contradictory_factors_collapse_to_zero() {
    let mut mgr = BddManager::new(1 << 22);
    let x = mgr.new_var_with_index(1).unwrap();
    let y = mgr.new_var_with_index(2).unwrap();
    let z = mgr.new_var_with_index(3).unwrap();
    let f1 = mgr.and(x, y).unwrap();
    let f2 = {
        let ny = mgr.not(y).unwrap();
        let a = mgr.and(x, ny).unwrap();
        mgr.and(a, z).unwrap()
    };
    let f3 = {
        let ny = mgr.not(y).unwrap();
        let nz = mgr.not(z).unwrap();
        let a = mgr.and(y, nz).unwrap();
        let b = mgr.and(ny, z).unwrap();
        mgr.or(a, b).unwrap()
    };
    let factors = [f1, f2, f3];
    let mut fg = FactorGraph::new(&mut mgr, &factors).unwrap();
    fg.converge(&mut mgr).unwrap();

    let non_x = mgr.cube_union(y, z).unwrap();
    let messages = fg.incoming_messages(&mut mgr, non_x).unwrap();
    assert!(!messages.is_empty());
    let conj = mgr.and_multi(&messages).unwrap();

    let exact = fg.exact_projection(&mut mgr, non_x).unwrap();
    assert!(mgr.is_zero(exact));
    // the messages entail the true projection, and conversely
    assert!(mgr.leq(conj, exact).unwrap());
    assert!(mgr.leq(exact, conj).unwrap());

    for m in messages {
        mgr.free(m).unwrap();
    }
    mgr.free(conj).unwrap();
    mgr.free(exact).unwrap();
    fg.release(&mut mgr).unwrap();
}

/// The generational invariant holds across grouping, hiding and rollback.
#[test]
fn generations_survive_a_mutation_storm() {
    let mut mgr = BddManager::new(1 << 22);
    let v: Vec<Bdd> = (1..=6).map(|i| mgr.new_var_with_index(i).unwrap()).collect();
    let mut factors = Vec::new();
    for w in v.windows(2) {
        let n = mgr.not(w[0]).unwrap();
        factors.push(mgr.or(n, w[1]).unwrap());
    }
    let mut fg = FactorGraph::new(&mut mgr, &factors).unwrap();
    let (funcs, vars, edges) = (
        fg.num_live_funcs(),
        fg.num_live_vars(),
        fg.num_live_edges(),
    );
    for _ in 0..3 {
        fg.checkpoint();
        let c = mgr.cube_union(v[1], v[2]).unwrap();
        fg.group_vars(&mut mgr, c).unwrap();
        mgr.free(c).unwrap();
        let hidden = fg.get_var_node(&mut mgr, v[4]).unwrap().unwrap();
        fg.hide_node(hidden);
        fg.verify().expect("invariant violated after mutation");
        fg.rollback(&mut mgr).unwrap();
        fg.verify().expect("invariant violated after rollback");
        assert_eq!(
            (funcs, vars, edges),
            (
                fg.num_live_funcs(),
                fg.num_live_vars(),
                fg.num_live_edges()
            )
        );
    }
    fg.release(&mut mgr).unwrap();
}
