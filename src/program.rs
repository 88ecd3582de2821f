//! The program under construction: nodes, edges, and the cross-invocation
//! maps the builder populates.
//!
//! [`Program`] is the sink the DDDG builder drains into. During a build it
//! accepts node insertions and attribute updates line by line; once the
//! builder flushes, it holds the final edge list plus the labelmap,
//! caller↔callee argument map, and array base registry that downstream
//! passes consume.

use crate::builder::value::encode_bytes_hex;
use crate::opcode;
use crate::source::{
    BasicBlockId, DynamicVariable, FunctionId, InstructionId, UniqueLabel, VariableId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// A virtual address as it appears in the trace, after masking.
pub type Addr = u64;

/// Dense dynamic-instruction identifier, equal to the trace's own counter.
pub type NodeId = u64;

/// Transitive resolution of the argument map is capped so a corrupt trace
/// cannot loop the walk; well-formed traces never create cycles.
const MAX_LOOKUP_HOPS: usize = 256;

/// The three dependence kinds the graph distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EdgeKind {
    /// Data flow through a register. `param` records which operand slot of
    /// the sink consumed the value (1-based).
    Register { param: i32 },
    /// Address-aliased RAW/WAW dependence through memory.
    Memory,
    /// Call/return sequencing and DMA fence barriers.
    Control,
}

/// One dependence edge of the finished graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub sink: NodeId,
    pub kind: EdgeKind,
}

/// The decoded payload of a scalar or vector memory access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MemValue {
    /// Up to 64 bits, stored as the raw bit pattern.
    Scalar { bits: u64, is_float: bool },
    /// Wider than 64 bits; the node owns the byte buffer.
    Vector { bytes: Vec<u8> },
}

/// A load or store access: value, size, and masked virtual address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemAccess {
    pub vaddr: Addr,
    /// Size of the access in bytes.
    pub size: usize,
    pub value: MemValue,
}

impl fmt::Display for MemAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            MemValue::Scalar { bits, is_float } => {
                let tag = if *is_float { "fp" } else { "int" };
                write!(f, "{:#x}+{}B {} {:#x}", self.vaddr, self.size, tag, bits)
            }
            MemValue::Vector { bytes } => {
                write!(
                    f,
                    "{:#x}+{}B vec {}",
                    self.vaddr,
                    self.size,
                    encode_bytes_hex(bytes, true)
                )
            }
        }
    }
}

/// A DMA transfer descriptor, common to both interface versions. Version 1
/// transfers use the same offset on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmaTransfer {
    pub base: Addr,
    pub src_offset: u64,
    pub dst_offset: u64,
    /// Transfer length in bytes.
    pub size: u64,
}

/// The memory-access descriptor attached to a node, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeAccess {
    Memory(MemAccess),
    Dma(DmaTransfer),
}

/// One dynamic instruction instance.
///
/// Created when its instruction line is parsed, attributed until the next
/// instruction line begins, never destroyed. The program owns all nodes.
#[derive(Debug, Clone)]
pub struct ExecNode {
    pub id: NodeId,
    pub microop: u8,
    pub line_num: u32,
    pub static_function: Option<FunctionId>,
    pub static_inst: Option<InstructionId>,
    pub basic_block: Option<BasicBlockId>,
    pub loop_depth: u32,
    /// Which dynamic invocation of its function this node executed in.
    pub dynamic_invocation: u32,
    pub variable: Option<VariableId>,
    pub array_label: Option<String>,
    pub access: Option<NodeAccess>,
    pub double_precision: bool,
}

impl ExecNode {
    fn new(id: NodeId, microop: u8) -> Self {
        Self {
            id,
            microop,
            line_num: 0,
            static_function: None,
            static_inst: None,
            basic_block: None,
            loop_depth: 0,
            dynamic_invocation: 0,
            variable: None,
            array_label: None,
            access: None,
            double_precision: false,
        }
    }

    pub fn is_call_op(&self) -> bool {
        opcode::is_call_op(self.microop)
    }

    pub fn is_ret_op(&self) -> bool {
        opcode::is_ret_op(self.microop)
    }

    pub fn is_dma_op(&self) -> bool {
        opcode::is_dma_op(self.microop)
    }

    pub fn is_dma_load(&self) -> bool {
        opcode::is_dma_load(self.microop)
    }

    pub fn is_dma_store(&self) -> bool {
        opcode::is_dma_store(self.microop)
    }

    pub fn is_fp_op(&self) -> bool {
        opcode::is_fp_op(self.microop)
    }

    pub fn is_trig_op(&self) -> bool {
        opcode::is_trig_op(self.microop)
    }

    /// The scalar/vector access of a load or store node.
    pub fn mem_access(&self) -> Option<&MemAccess> {
        match &self.access {
            Some(NodeAccess::Memory(access)) => Some(access),
            _ => None,
        }
    }

    /// The transfer descriptor of a DMA node.
    pub fn dma_transfer(&self) -> Option<&DmaTransfer> {
        match &self.access {
            Some(NodeAccess::Dma(dma)) => Some(dma),
            _ => None,
        }
    }
}

/// Caller↔callee argument bindings.
///
/// Maps a callee formal register to the caller-side register whose value it
/// received. Lookups resolve transitively so that a formal forwarded through
/// several call layers lands on the original declaration.
#[derive(Debug, Default)]
pub struct CallArgMap {
    map: HashMap<DynamicVariable, DynamicVariable>,
}

impl CallArgMap {
    /// Bind a callee formal to its caller-side source.
    pub fn add(&mut self, from: DynamicVariable, to: DynamicVariable) {
        self.map.insert(from, to);
    }

    /// Follow bindings until a representative is reached. Returns the input
    /// unchanged when it has no binding. The walk is capped; a corrupt map
    /// terminates at the last resolved reference.
    pub fn lookup(&self, var: DynamicVariable) -> DynamicVariable {
        let mut current = var;
        for _ in 0..MAX_LOOKUP_HOPS {
            match self.map.get(&current) {
                Some(&next) => current = next,
                None => break,
            }
        }
        current
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// The program sink: node table, edge list, and the maps shared with the
/// rest of the simulator.
#[derive(Debug, Default)]
pub struct Program {
    nodes: BTreeMap<NodeId, ExecNode>,
    edges: Vec<Edge>,
    /// Source line number → labels declared on that line. A line carries the
    /// original label plus one entry per inlined caller.
    pub labelmap: BTreeMap<u32, Vec<UniqueLabel>>,
    /// Inlined label → the original label it was cloned from, so directives
    /// declared on the original propagate to inlined copies.
    pub inline_labelmap: HashMap<UniqueLabel, UniqueLabel>,
    /// Caller↔callee argument bindings populated by the forward parser.
    pub call_arg_map: CallArgMap,
    array_base_addr: BTreeMap<String, Addr>,
    function_names: BTreeSet<String>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node by its trace id and microop, returning it for
    /// attribution.
    pub fn insert_node(&mut self, id: NodeId, microop: u8) -> &mut ExecNode {
        self.nodes.entry(id).or_insert_with(|| ExecNode::new(id, microop))
    }

    pub fn node(&self, id: NodeId) -> Option<&ExecNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut ExecNode> {
        self.nodes.get_mut(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ExecNode> {
        self.nodes.values()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn max_node_id(&self) -> Option<NodeId> {
        self.nodes.keys().next_back().copied()
    }

    /// Append an edge. Deduplication happens upstream in the builder's edge
    /// tables; the program records what it is handed.
    pub fn add_edge(&mut self, source: NodeId, sink: NodeId, kind: EdgeKind) {
        self.edges.push(Edge { source, sink, kind });
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Record the base virtual address of a named array. Later registrations
    /// overwrite earlier ones, matching trace order.
    pub fn register_array_base(&mut self, name: &str, addr: Addr) {
        self.array_base_addr.insert(name.to_string(), addr);
    }

    pub fn array_base(&self, name: &str) -> Option<Addr> {
        self.array_base_addr.get(name).copied()
    }

    pub fn array_bases(&self) -> impl Iterator<Item = (&str, Addr)> {
        self.array_base_addr.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// Register a static function name seen in the trace.
    pub fn add_function_name(&mut self, name: &str) {
        self.function_names.insert(name.to_string());
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.function_names.iter().map(String::as_str)
    }

    /// Record a labelmap entry for its source line.
    pub fn insert_label(&mut self, label: UniqueLabel) {
        self.labelmap.entry(label.line_number).or_default().push(label);
    }
}
