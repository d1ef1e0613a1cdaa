/// API for object properties.
pub trait FlagIF {
    type FlagType;
    /// return true if the flag is on.
    fn is(&self, flag: Self::FlagType) -> bool;
    /// toggle the flag off.
    fn turn_off(&mut self, flag: Self::FlagType);
    /// toggle the flag on.
    fn turn_on(&mut self, flag: Self::FlagType);
}

bitflags! {
    /// Transient traversal state of a factor-graph node.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
    pub struct FlagNode: u8 {
        /// the node sits in the current worklist or BFS frontier.
        const VISITED = 0b0000_0001;
    }
}

bitflags! {
    /// Misc flags used by resolution clauses.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
    pub struct FlagClause: u8 {
        /// the clause may still be used as a resolution candidate.
        const ENABLED = 0b0000_0001;
        /// the clause passed through to the result untouched.
        const PASSED_THROUGH = 0b0000_0010;
    }
}
