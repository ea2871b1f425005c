/// A handle into the sandbox engine's value space.
///
/// Heap-backed variants (`External`, `Record`, `Function`) carry the slab key
/// of their cell; the handle itself is plain data and stays valid only as
/// long as the cell is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxValue {
    Undefined,
    Bool(bool),
    Int(i64),
    Str(String),
    External(usize),
    Record(usize),
    Function(usize),
}
