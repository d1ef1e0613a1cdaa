//! Graphviz dump of the live graph: factors as boxes, variables as
//! ellipses, labels derived from node identity and support size.

use {
    super::FactorGraph,
    crate::bdd::BddManager,
    std::io::{self, Write},
};

impl FactorGraph {
    pub fn write_dot<W: Write>(&self, mgr: &BddManager, out: &mut W) -> io::Result<()> {
        writeln!(out, "graph {{")?;
        for f in self.live_funcs() {
            let width = mgr.size(self.support_of(f)).saturating_sub(1);
            writeln!(
                out,
                "f{0} [label=\"f{0}({1})\", shape=box];",
                self.node(f).id,
                width
            )?;
        }
        for v in self.live_vars() {
            let width = mgr.size(self.cube_of(v)).saturating_sub(1);
            writeln!(out, "v{0} [label=\"v{0}({1})\"];", self.node(v).id, width)?;
        }
        for e in self.live_edges() {
            let ed = self.edge(e);
            writeln!(
                out,
                "f{} -- v{};",
                self.node(ed.func).id,
                self.node(ed.var).id
            )?;
        }
        writeln!(out, "}}")
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::fgraph::FactorGraph};

    #[test]
    fn test_dot_shapes() {
        let mut mgr = BddManager::new(1 << 20);
        let a = mgr.new_var_with_index(1).unwrap();
        let b = mgr.new_var_with_index(2).unwrap();
        let f = mgr.and(a, b).unwrap();
        let fg = FactorGraph::new(&mut mgr, &[f]).unwrap();
        let mut buf = Vec::new();
        fg.write_dot(&mgr, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("graph {"));
        assert!(text.contains("shape=box"));
        assert_eq!(text.matches(" -- ").count(), 2);
    }
}
