//! Dynamic data dependence graph construction from an execution trace.
//!
//! The builder streams a line-oriented dynamic trace and grows three kinds of
//! dependence edges between dynamic instruction instances:
//!
//! - Register edges: data flow from a register's last writer to each reader
//! - Memory edges: byte-granular RAW/WAW aliasing between loads, stores, and
//!   DMA transfers
//! - Control edges: call/return serialization and DMA fence barriers
//!
//! Parsing is strictly sequential; every line mutates a set of live maps
//! (register and address last-writer tables, pending edge tables, the
//! dynamic-function stack) whose contents are flushed into the program sink
//! once the traced top-level function returns.
//!
//! # Example
//!
//! ```ignore
//! let mut program = Program::new();
//! let mut src = SourceManager::new();
//! let mut builder = DddgBuilder::new(&mut program, &mut src, BuildConfig::default());
//! let mut scanner = TraceScanner::new(reader, 0, trace_size);
//! let outcome = builder.build(&mut scanner)?;
//! ```

use crate::error::{BuildError, ErrorKind};
use crate::opcode;
use crate::program::{
    Addr, DmaTransfer, EdgeKind, MemAccess, MemValue, NodeAccess, NodeId, Program,
};
use crate::progress::ProgressTracker;
use crate::source::{DynamicFunction, DynamicVariable, FunctionId, SourceManager, UniqueLabel};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{self, BufRead};
use tracing::info;

pub mod labelmap;
pub mod value;

use labelmap::{LABELMAP_END, LABELMAP_START};
use value::ValueKind;

/// Mask applied to every virtual address parsed from the trace.
pub const ADDR_MASK: u64 = 0xffff_ffff;

/// Width of the trace's size fields.
pub const BITS_PER_BYTE: u32 = 8;

/// Loop depths at or beyond this bound indicate a corrupt trace.
pub const MAX_LOOP_DEPTH: u32 = 1000;

/// Build-time configuration consumed from the datapath.
#[derive(Debug, Clone, Copy)]
pub struct BuildConfig {
    /// Mask applied to every parsed virtual address.
    pub address_mask: u64,
    /// Ready-mode datapaths issue loads and stores as soon as their data is
    /// available, so DMA loads are skipped as memory-dependence sources.
    pub ready_mode: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            address_mask: ADDR_MASK,
            ready_mode: false,
        }
    }
}

/// How a build run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The traced top-level function returned (or the trace ran out after at
    /// least one instruction); the graph was flushed into the program.
    Complete {
        /// Byte offset just past the last consumed line, where the next
        /// build should resume.
        next_offset: u64,
    },
    /// No instruction line was found before end of trace.
    EndOfTrace,
}

/// Edge and node counters accumulated over one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub num_nodes: u64,
    pub num_register_deps: u64,
    pub num_memory_deps: u64,
    pub num_control_deps: u64,
}

impl BuildStats {
    pub fn num_edges(&self) -> u64 {
        self.num_register_deps + self.num_memory_deps + self.num_control_deps
    }
}

/// Line-oriented reader over the (already decompressed) trace stream,
/// tracking the byte offset for progress reporting and error positioning.
///
/// The compressed-file reader is an external collaborator: anything that
/// implements [`BufRead`] plugs in, positioned at `start_offset`.
#[derive(Debug)]
pub struct TraceScanner<R> {
    reader: R,
    offset: u64,
    trace_size: u64,
}

impl<R: BufRead> TraceScanner<R> {
    pub fn new(reader: R, start_offset: u64, trace_size: u64) -> Self {
        Self {
            reader,
            offset: start_offset,
            trace_size,
        }
    }

    /// Byte offset just past the most recently read line.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn trace_size(&self) -> u64 {
        self.trace_size
    }

    /// Read the next line into `buf`. Returns false at end of stream.
    pub fn next_line(&mut self, buf: &mut String) -> io::Result<bool> {
        buf.clear();
        let n = self.reader.read_line(buf)?;
        self.offset += n as u64;
        Ok(n > 0)
    }
}

/// A pending register edge: the sink and which of its operand slots consumed
/// the value.
#[derive(Debug, Clone, Copy)]
struct RegisterEdge {
    sink: NodeId,
    param: i32,
}

/// The parsed payload of an instruction line (tag `0`).
#[derive(Debug)]
struct InstructionLine<'a> {
    line_num: u32,
    static_function: &'a str,
    /// Raw `name:loop_depth` basic-block id.
    bblock_id: &'a str,
    inst_id: &'a str,
    microop: u8,
    node_id: NodeId,
}

/// Streaming DDDG builder over one trace region.
///
/// Holds the live maps for the duration of the parse and drains them into
/// the program as edges when the build completes. The program and symbol
/// interner are mutated by the builder alone until [`build`](Self::build)
/// returns.
pub struct DddgBuilder<'a> {
    program: &'a mut Program,
    src: &'a mut SourceManager,
    config: BuildConfig,

    num_register_deps: u64,
    num_memory_deps: u64,
    num_control_deps: u64,
    num_instructions: u64,

    curr_node_id: Option<NodeId>,
    curr_microop: u8,
    prev_microop: u8,
    curr_bblock: String,
    prev_bblock: String,
    curr_dynamic_function: Option<DynamicFunction>,

    /// Stack of dynamic function invocations; top is currently executing.
    active_method: Vec<DynamicFunction>,
    /// Last writer of each live register.
    register_last_written: HashMap<DynamicVariable, NodeId>,
    /// Last writer of each live byte.
    address_last_written: HashMap<Addr, NodeId>,
    /// Pending register edges, keyed by source node.
    register_edge_table: BTreeMap<NodeId, Vec<RegisterEdge>>,
    /// Pending memory edges, keyed by source node.
    memory_edge_table: BTreeMap<NodeId, BTreeSet<NodeId>>,
    /// Pending control edges, keyed by source node.
    control_edge_table: BTreeMap<NodeId, BTreeSet<NodeId>>,
    /// Non-DMA nodes since the last call/return boundary.
    nodes_since_last_ret: Vec<NodeId>,
    last_ret: Option<NodeId>,
    /// DMA transfers issued since the most recent fence.
    last_dma_nodes: Vec<NodeId>,
    last_dma_fence: Option<NodeId>,

    last_parameter: bool,
    num_parameters: i32,
    /// Masked address-like operand values of the current instruction, in
    /// parse order.
    param_values: Vec<Addr>,
    param_sizes: Vec<u32>,
    param_labels: Vec<String>,
    callee_function: Option<FunctionId>,
    callee_dynamic_function: Option<DynamicFunction>,
    /// Caller-side register of the call argument being forwarded, consumed
    /// by the next `f` line.
    unique_reg_in_caller: Option<DynamicVariable>,
    /// Caller-side writer of the call argument being forwarded.
    last_call_source: Option<NodeId>,
}

impl<'a> DddgBuilder<'a> {
    pub fn new(
        program: &'a mut Program,
        src: &'a mut SourceManager,
        config: BuildConfig,
    ) -> Self {
        Self {
            program,
            src,
            config,
            num_register_deps: 0,
            num_memory_deps: 0,
            num_control_deps: 0,
            num_instructions: 0,
            curr_node_id: None,
            curr_microop: opcode::LLVM_IR_MOVE,
            prev_microop: opcode::LLVM_IR_MOVE,
            curr_bblock: "-1".to_string(),
            prev_bblock: "-1".to_string(),
            curr_dynamic_function: None,
            active_method: Vec::new(),
            register_last_written: HashMap::new(),
            address_last_written: HashMap::new(),
            register_edge_table: BTreeMap::new(),
            memory_edge_table: BTreeMap::new(),
            control_edge_table: BTreeMap::new(),
            nodes_since_last_ret: Vec::new(),
            last_ret: None,
            last_dma_nodes: Vec::new(),
            last_dma_fence: None,
            last_parameter: false,
            num_parameters: 0,
            param_values: Vec::new(),
            param_sizes: Vec::new(),
            param_labels: Vec::new(),
            callee_function: None,
            callee_dynamic_function: None,
            unique_reg_in_caller: None,
            last_call_source: None,
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> BuildStats {
        BuildStats {
            num_nodes: self.num_instructions,
            num_register_deps: self.num_register_deps,
            num_memory_deps: self.num_memory_deps,
            num_control_deps: self.num_control_deps,
        }
    }

    /// Operand count of the most recently parsed instruction, recorded from
    /// the tag of its first-parsed parameter line.
    pub fn last_operand_count(&self) -> i32 {
        self.num_parameters
    }

    /// Scan the trace to end of stream, or until the first traced function
    /// returns, then flush all pending edges into the program.
    ///
    /// Returns the offset to resume the next build from, or
    /// [`BuildOutcome::EndOfTrace`] if no instruction line was seen. The
    /// first error is fatal and carries the byte offset of the failing line.
    pub fn build<R: BufRead>(
        &mut self,
        scanner: &mut TraceScanner<R>,
    ) -> Result<BuildOutcome, BuildError> {
        info!("generating DDDG");
        let mut progress = ProgressTracker::new(scanner.trace_size());
        let mut first_function: Option<String> = None;
        let mut first_function_returned = false;
        let mut in_labelmap = false;
        let mut labelmap_done = false;
        let mut line = String::new();

        loop {
            let more = scanner
                .next_line(&mut line)
                .map_err(|e| BuildError::new(scanner.offset(), e.into()))?;
            if !more {
                break;
            }
            let offset = scanner.offset();
            progress.update(offset, self.num_instructions);
            let wholeline = line.trim_end_matches(['\r', '\n']);

            // Scan for the labelmap block until it is parsed or the first
            // tagged record proves it absent.
            if !labelmap_done {
                if !in_labelmap {
                    if wholeline.contains(LABELMAP_START) {
                        in_labelmap = true;
                        continue;
                    }
                } else if wholeline.contains(LABELMAP_END) {
                    labelmap_done = true;
                    in_labelmap = false;
                    continue;
                } else {
                    self.record_labelmap_line(wholeline)
                        .map_err(|kind| BuildError::new(offset, kind))?;
                    continue;
                }
            }

            let Some((tag, rest)) = wholeline.split_once(',') else {
                if first_function_returned {
                    break;
                }
                continue;
            };
            labelmap_done = true;

            let result = match tag {
                "0" => self.handle_instruction_record(
                    rest,
                    &mut first_function,
                    &mut first_function_returned,
                ),
                "r" => self.parse_result(rest),
                "f" => self.parse_forward(rest),
                other => match other.trim().parse::<i64>() {
                    Ok(index) if index >= 1 => self.parse_parameter(rest, index as i32),
                    Ok(index) => Err(ErrorKind::CorruptTrace {
                        reason: format!("non-positive operand index {index}"),
                    }),
                    Err(_) => Err(ErrorKind::MalformedLine {
                        tag: "record",
                        reason: format!("unknown tag {other:?}"),
                    }),
                },
            };
            result.map_err(|kind| BuildError::new(offset, kind))?;
        }

        if first_function.is_some() {
            self.flush_edges();
            let stats = self.stats();
            info!(
                nodes = stats.num_nodes,
                edges = stats.num_edges(),
                register_edges = stats.num_register_deps,
                memory_edges = stats.num_memory_deps,
                control_edges = stats.num_control_deps,
                "DDDG build complete"
            );
            Ok(BuildOutcome::Complete {
                next_offset: scanner.offset(),
            })
        } else {
            info!("reached end of trace");
            Ok(BuildOutcome::EndOfTrace)
        }
    }

    /// Parse an instruction header, maintain the first-function termination
    /// state, and dispatch to the instruction-line parser.
    fn handle_instruction_record(
        &mut self,
        rest: &str,
        first_function: &mut Option<String>,
        first_function_returned: &mut bool,
    ) -> Result<(), ErrorKind> {
        let header = parse_instruction_header(rest)?;
        if first_function.is_none() {
            *first_function = Some(header.static_function.to_string());
        }
        // The flag tracks the most recent instruction line only: a further
        // instruction after the return re-arms the scan.
        *first_function_returned = opcode::is_ret_op(header.microop)
            && first_function.as_deref() == Some(header.static_function);
        self.parse_instruction_line(&header)
    }

    /// Record one labelmap body line, including its inlined copies.
    fn record_labelmap_line(&mut self, line: &str) -> Result<(), ErrorKind> {
        let parsed = labelmap::parse_labelmap_line(line)?;
        let function = self.src.intern_function(parsed.function);
        let label = self.src.intern_label(parsed.label);
        let original = UniqueLabel::new(function, label, parsed.line_number);
        self.program.insert_label(original);
        for caller in &parsed.inline_callers {
            let caller_func = self.src.intern_function(caller);
            let inlined = UniqueLabel::new(caller_func, label, parsed.line_number);
            self.program.insert_label(inlined);
            // Associate the inlined copy with its original so directives
            // declared on the original propagate.
            self.program.inline_labelmap.insert(inlined, original);
        }
        Ok(())
    }

    /// Create the node for an instruction line and update every piece of
    /// per-instruction state: the call/return barrier, the dynamic-function
    /// stack, PHI block tracking, DMA fences, and the operand accumulators.
    fn parse_instruction_line(&mut self, header: &InstructionLine<'_>) -> Result<(), ErrorKind> {
        let (bblock_name, loop_depth) = parse_basic_block_id(header.bblock_id)?;
        if loop_depth >= MAX_LOOP_DEPTH {
            return Err(ErrorKind::CorruptTrace {
                reason: format!("loop depth {loop_depth} is much higher than expected"),
            });
        }

        self.num_instructions += 1;
        self.prev_microop = self.curr_microop;
        self.curr_microop = header.microop;
        let node_id = header.node_id;
        self.curr_node_id = Some(node_id);
        let microop = header.microop;

        let curr_function = self.src.intern_function(header.static_function);
        let curr_inst = self.src.intern_instruction(header.inst_id);
        let basic_block = self.src.intern_basic_block(bblock_name);
        {
            let node = self.program.insert_node(node_id, microop);
            node.line_num = header.line_num;
            node.static_inst = Some(curr_inst);
            node.static_function = Some(curr_function);
            node.basic_block = Some(basic_block);
            node.loop_depth = loop_depth;
        }
        self.program.add_function_name(header.static_function);

        // Enforce dependences on function call boundaries. Another function
        // cannot be called until all previous nodes in the current function
        // have finished, and a function must execute all its nodes before
        // nodes in the parent can execute. DMA nodes are exempt.
        if opcode::is_ret_op(microop) || opcode::is_call_op(microop) {
            let pending = std::mem::take(&mut self.nodes_since_last_ret);
            for source in pending {
                self.insert_control_dependence(source, node_id);
            }
            if let Some(last_ret) = self.last_ret {
                if last_ret != node_id {
                    self.insert_control_dependence(last_ret, node_id);
                }
            }
            self.last_ret = Some(node_id);
        } else if !opcode::is_dma_op(microop) {
            self.nodes_since_last_ret.push(node_id);
        }

        let mut func_invocation_count = 0;
        let mut curr_func_found = false;
        if let Some(top) = self.active_method.last().copied() {
            if top.function == curr_function {
                let prev_counts = self.src.invocations(curr_function);
                if self.prev_microop == opcode::LLVM_IR_CALL
                    && self.callee_function == Some(curr_function)
                {
                    // The function is calling itself: a fresh invocation.
                    func_invocation_count = self.src.increment_invocations(curr_function);
                    self.active_method
                        .push(DynamicFunction::new(curr_function, func_invocation_count));
                } else {
                    func_invocation_count = prev_counts;
                }
                self.curr_dynamic_function = self.active_method.last().copied();
                curr_func_found = true;
            }
            if opcode::is_ret_op(microop) {
                self.active_method.pop();
            }
        }
        if !curr_func_found {
            // Only reachable on entry into a different callee.
            func_invocation_count = self.src.increment_invocations(curr_function);
            let dynamic = DynamicFunction::new(curr_function, func_invocation_count);
            self.active_method.push(dynamic);
            self.curr_dynamic_function = Some(dynamic);
        }

        // Latch the incoming basic block for the PHI group that starts here.
        if opcode::is_phi_op(microop) && !opcode::is_phi_op(self.prev_microop) {
            self.prev_bblock = self.curr_bblock.clone();
        }

        if opcode::is_dma_fence(microop) {
            self.last_dma_fence = Some(node_id);
            let pending = std::mem::take(&mut self.last_dma_nodes);
            for source in pending {
                self.insert_control_dependence(source, node_id);
            }
        } else if opcode::is_dma_load(microop) || opcode::is_dma_store(microop) {
            if let Some(fence) = self.last_dma_fence {
                self.insert_control_dependence(fence, node_id);
            }
            self.last_dma_nodes.push(node_id);
        }

        self.curr_bblock = header.bblock_id.to_string();
        if let Some(node) = self.program.node_mut(node_id) {
            node.dynamic_invocation = func_invocation_count;
        }
        self.last_parameter = false;
        self.param_values.clear();
        self.param_sizes.clear();
        self.param_labels.clear();
        Ok(())
    }

    /// Process one operand line of the current instruction.
    fn parse_parameter(&mut self, rest: &str, param_tag: i32) -> Result<(), ErrorKind> {
        let node_id = self.curr_node_id.ok_or_else(|| ErrorKind::UnexpectedState {
            reason: "parameter line with no preceding instruction line".to_string(),
        })?;
        let is_phi = opcode::is_phi_op(self.curr_microop);
        let fields = split_fields(rest);
        let expected = if is_phi { 5 } else { 4 };
        if fields.len() != expected {
            return Err(ErrorKind::MalformedLine {
                tag: "parameter",
                reason: format!("expected {expected} fields, found {}", fields.len()),
            });
        }
        let size = parse_field::<u32>(fields[0], "parameter", "size")?;
        let value_text = fields[1];
        let is_reg = parse_field::<i32>(fields[2], "parameter", "register flag")? != 0;
        let label = fields[3];
        if is_phi && fields[4] != self.prev_bblock {
            // Only the incoming value from the previously executed basic
            // block is live; skip the others.
            return Ok(());
        }

        let value_kind = value::classify(size, value_text);
        let value = if value_kind == ValueKind::Vector {
            0.0
        } else {
            value::parse_scalar(value_text)
        };

        if !self.last_parameter {
            self.num_parameters = param_tag;
            if opcode::is_call_op(self.curr_microop) {
                self.callee_function = Some(self.src.intern_function(label));
            }
            if let Some(callee) = self.callee_function {
                // The invocation ordinal the callee's entry line will push.
                self.callee_dynamic_function = Some(DynamicFunction::new(
                    callee,
                    self.src.invocations(callee) + 1,
                ));
            }
        }
        self.last_parameter = true;
        self.last_call_source = None;

        if is_reg {
            let variable = self.src.intern_variable(label);
            let curr_dyn = self.current_dynamic_function()?;
            let unique_reg_ref = DynamicVariable::new(curr_dyn, variable);
            if opcode::is_call_op(self.curr_microop) {
                self.unique_reg_in_caller = Some(unique_reg_ref);
            }
            if let Some(&writer) = self.register_last_written.get(&unique_reg_ref) {
                self.register_edge_table
                    .entry(writer)
                    .or_default()
                    .push(RegisterEdge {
                        sink: node_id,
                        param: param_tag,
                    });
                self.num_register_deps += 1;
                if opcode::is_call_op(self.curr_microop) {
                    self.last_call_source = Some(writer);
                }
            } else if (opcode::is_store_op(self.curr_microop) && param_tag == 2)
                || (opcode::is_load_op(self.curr_microop) && param_tag == 1)
            {
                // No GEP preceded this access; the access itself implicitly
                // defines the address-holding register.
                self.register_last_written.insert(unique_reg_ref, node_id);
            }
        }

        let is_load = opcode::is_load_op(self.curr_microop);
        let is_store = opcode::is_store_op(self.curr_microop);
        let is_gep = opcode::is_gep_op(self.curr_microop);
        if is_load || is_store || is_gep || opcode::is_dma_op(self.curr_microop) {
            self.param_values
                .push((value as u64) & self.config.address_mask);
            self.param_sizes.push(size);
            self.param_labels.push(label.to_string());

            if param_tag == 1 && is_load {
                // The label names the register holding the address.
                let reg_name = self.param_labels.last().unwrap().clone();
                let var = self.src.intern_variable(&reg_name);
                if let Some(node) = self.program.node_mut(node_id) {
                    node.variable = Some(var);
                    node.array_label = Some(reg_name);
                }
            } else if param_tag == 1 && is_store {
                // Operand 1 is the stored value; the address arrived as
                // operand 2, which the trace emits first.
                let mem_address = self.param_values[0];
                let mem_size = (size / BITS_PER_BYTE) as usize;
                let mut access =
                    self.create_mem_access(value_text, value, mem_size, value_kind)?;
                access.vaddr = mem_address;
                if let Some(node) = self.program.node_mut(node_id) {
                    node.access = Some(NodeAccess::Memory(access));
                }
            } else if param_tag == 2 && is_store {
                let mem_address = self.param_values[0];
                let mem_size = (self.param_sizes.last().unwrap() / BITS_PER_BYTE) as u64;

                // If the last writer was a DMA load, the ordering must be
                // kept: DMA loads are variable-latency operations.
                let last_writer = self.address_last_written.get(&mem_address).copied();
                if last_writer
                    .and_then(|id| self.program.node(id))
                    .is_some_and(|n| n.is_dma_load())
                {
                    self.handle_post_write_dependency(mem_address, mem_size, node_id);
                }
                for addr in mem_address..mem_address.saturating_add(mem_size) {
                    self.address_last_written.insert(addr, node_id);
                }

                let reg_name = self.param_labels[0].clone();
                let var = self.src.intern_variable(&reg_name);
                if let Some(node) = self.program.node_mut(node_id) {
                    node.variable = Some(var);
                    node.array_label = Some(reg_name);
                }
            } else if param_tag == 1 && is_gep {
                let base_address = *self.param_values.last().unwrap();
                let base_label = self.param_labels.last().unwrap().clone();
                // Dependences are locally enforced under the perceived name,
                // but the array label must resolve to the real array.
                let var = self.src.intern_variable(&base_label);
                let real_var = self.array_real_var(&base_label)?;
                let real_name = self.src.variable_name(real_var).to_string();
                if let Some(node) = self.program.node_mut(node_id) {
                    node.variable = Some(var);
                    node.array_label = Some(real_name.clone());
                }
                self.program.register_array_base(&real_name, base_address);
            }
            // DMA operands carry no per-operand dependence work: the result
            // parser needs the full argument list first.
        }
        Ok(())
    }

    /// Finalize the current instruction's output from its `r` line.
    fn parse_result(&mut self, rest: &str) -> Result<(), ErrorKind> {
        let node_id = self.curr_node_id.ok_or_else(|| ErrorKind::UnexpectedState {
            reason: "result line with no preceding instruction line".to_string(),
        })?;
        let fields = split_fields(rest);
        if fields.len() != 4 {
            return Err(ErrorKind::MalformedLine {
                tag: "result",
                reason: format!("expected 4 fields, found {}", fields.len()),
            });
        }
        let size = parse_field::<u32>(fields[0], "result", "size")?;
        let value_text = fields[1];
        let is_reg = parse_field::<i32>(fields[2], "result", "register flag")? != 0;
        let label = fields[3];
        if !is_reg {
            return Err(ErrorKind::MalformedLine {
                tag: "result",
                reason: "destination is not a register".to_string(),
            });
        }

        let value_kind = value::classify(size, value_text);
        let value = if value_kind == ValueKind::Vector {
            0.0
        } else {
            value::parse_scalar(value_text)
        };

        if size == 64 {
            if let Some(node) = self.program.node_mut(node_id) {
                if node.is_fp_op() {
                    node.double_precision = true;
                }
            }
        }

        let var = self.src.intern_variable(label);
        let curr_dyn = self.current_dynamic_function()?;
        self.register_last_written
            .insert(DynamicVariable::new(curr_dyn, var), node_id);

        if self.curr_microop == opcode::LLVM_IR_ALLOCA {
            if let Some(node) = self.program.node_mut(node_id) {
                node.variable = Some(var);
                node.array_label = Some(label.to_string());
            }
            self.program
                .register_array_base(label, (value as u64) & self.config.address_mask);
        } else if opcode::is_load_op(self.curr_microop) {
            let mem_address =
                *self
                    .param_values
                    .last()
                    .ok_or_else(|| ErrorKind::UnexpectedState {
                        reason: "load result with no buffered address operand".to_string(),
                    })?;
            let mem_size = (size / BITS_PER_BYTE) as usize;
            let mut access = self.create_mem_access(value_text, value, mem_size, value_kind)?;
            access.vaddr = mem_address;
            self.handle_post_write_dependency(mem_address, mem_size as u64, node_id);
            if let Some(node) = self.program.node_mut(node_id) {
                node.access = Some(NodeAccess::Memory(access));
            }
        } else if opcode::is_dma_op(self.curr_microop) {
            let v = &self.param_values;
            let (base, src_offset, dst_offset, transfer_size) = match v.len() {
                // v1: source and destination share one offset.
                4 => (v[1], v[2], v[2], v[3]),
                // v2: separate source and destination offsets.
                5 => (v[1], v[2], v[3], v[4]),
                found => return Err(ErrorKind::MalformedDmaOp { found }),
            };
            if let Some(node) = self.program.node_mut(node_id) {
                node.access = Some(NodeAccess::Dma(DmaTransfer {
                    base,
                    src_offset,
                    dst_offset,
                    size: transfer_size,
                }));
            }
            if opcode::is_dma_load(self.curr_microop) {
                // A DMA load stores into accelerator-visible memory, so it
                // becomes the last writer of its byte range and enforces RAW
                // and WAW on subsequent accesses. Under ready-mode, accesses
                // issue as soon as their data arrives, so the update is
                // skipped entirely.
                if !self.config.ready_mode {
                    let start = base.saturating_add(dst_offset);
                    for addr in start..start.saturating_add(transfer_size) {
                        self.address_last_written.insert(addr, node_id);
                    }
                }
            } else {
                // A DMA store reads accelerator memory: RAW only.
                let start = base.saturating_add(src_offset);
                self.handle_post_write_dependency(start, transfer_size, node_id);
            }
        }
        Ok(())
    }

    /// Bind a callee formal register from an `f` line.
    fn parse_forward(&mut self, rest: &str) -> Result<(), ErrorKind> {
        let node_id = self.curr_node_id.ok_or_else(|| ErrorKind::UnexpectedState {
            reason: "forward line with no preceding instruction line".to_string(),
        })?;
        // DMA and trig operations are not treated as called functions; their
        // forward lines carry no register mappings.
        if opcode::is_dma_op(self.curr_microop) || opcode::is_trig_op(self.curr_microop) {
            return Ok(());
        }
        let fields = split_fields(rest);
        if fields.len() != 4 {
            return Err(ErrorKind::MalformedLine {
                tag: "forward",
                reason: format!("expected 4 fields, found {}", fields.len()),
            });
        }
        let _size = parse_field::<u32>(fields[0], "forward", "size")?;
        let is_reg = parse_field::<i32>(fields[2], "forward", "register flag")? != 0;
        let label = fields[3];
        if !is_reg {
            return Err(ErrorKind::MalformedLine {
                tag: "forward",
                reason: "forwarded formal is not a register".to_string(),
            });
        }
        if !opcode::is_call_op(self.curr_microop) {
            return Err(ErrorKind::UnexpectedState {
                reason: "forward line outside a call".to_string(),
            });
        }
        let callee_dyn =
            self.callee_dynamic_function
                .ok_or_else(|| ErrorKind::UnexpectedState {
                    reason: "forward line before any call parameter".to_string(),
                })?;

        let var = self.src.intern_variable(label);
        let unique_reg_ref = DynamicVariable::new(callee_dyn, var);
        // Map the callee formal to the caller-side register so GEPs inside
        // the callee can resolve the real array.
        if let Some(caller_ref) = self.unique_reg_in_caller.take() {
            self.program.call_arg_map.add(unique_reg_ref, caller_ref);
        }
        // Uses of the formal inside the callee resolve to the caller-side
        // writer when one exists, otherwise to the call itself.
        let written_by = self.last_call_source.unwrap_or(node_id);
        self.register_last_written.insert(unique_reg_ref, written_by);
        Ok(())
    }

    /// Build a scalar or vector access from a decoded value.
    fn create_mem_access(
        &self,
        value_text: &str,
        value: f64,
        size_bytes: usize,
        kind: ValueKind,
    ) -> Result<MemAccess, ErrorKind> {
        let decoded = match kind {
            ValueKind::Vector => MemValue::Vector {
                bytes: value::decode_vector(value_text)?,
            },
            _ => {
                let is_float = kind == ValueKind::Float;
                MemValue::Scalar {
                    bits: value::scalar_to_bits(value, size_bytes, is_float),
                    is_float,
                }
            }
        };
        Ok(MemAccess {
            vaddr: 0,
            size: size_bytes,
            value: decoded,
        })
    }

    /// Emit memory edges from every recorded byte-writer in
    /// `[start, start + size)` to `sink`.
    fn handle_post_write_dependency(&mut self, start: Addr, size: u64, sink: NodeId) {
        for addr in start..start.saturating_add(size) {
            if let Some(&writer) = self.address_last_written.get(&addr) {
                let sinks = self.memory_edge_table.entry(writer).or_default();
                if sinks.insert(sink) {
                    self.num_memory_deps += 1;
                }
            }
        }
    }

    fn insert_control_dependence(&mut self, source: NodeId, sink: NodeId) {
        let sinks = self.control_edge_table.entry(source).or_default();
        if sinks.insert(sink) {
            self.num_control_deps += 1;
        }
    }

    /// Resolve the array a local name refers to by walking the caller↔callee
    /// argument map back to the original declaration.
    fn array_real_var(
        &mut self,
        array_name: &str,
    ) -> Result<crate::source::VariableId, ErrorKind> {
        let var = self.src.intern_variable(array_name);
        let curr_dyn = self.current_dynamic_function()?;
        let dyn_var = DynamicVariable::new(curr_dyn, var);
        Ok(self.program.call_arg_map.lookup(dyn_var).variable)
    }

    fn current_dynamic_function(&self) -> Result<DynamicFunction, ErrorKind> {
        self.curr_dynamic_function
            .ok_or_else(|| ErrorKind::UnexpectedState {
                reason: "no active dynamic function".to_string(),
            })
    }

    /// Drain the pending edge tables into the program. Table iteration is
    /// ordered by (source, sink), so the emitted edge list is reproducible
    /// for a given trace.
    fn flush_edges(&mut self) {
        for (&source, edges) in &self.register_edge_table {
            for edge in edges {
                self.program
                    .add_edge(source, edge.sink, EdgeKind::Register { param: edge.param });
            }
        }
        for (&source, sinks) in &self.memory_edge_table {
            for &sink in sinks {
                self.program.add_edge(source, sink, EdgeKind::Memory);
            }
        }
        for (&source, sinks) in &self.control_edge_table {
            for &sink in sinks {
                self.program.add_edge(source, sink, EdgeKind::Control);
            }
        }
    }
}

/// Split a record payload on commas, dropping the trailing empty field left
/// by lines that end with a comma.
fn split_fields(rest: &str) -> Vec<&str> {
    let mut fields: Vec<&str> = rest.split(',').collect();
    if fields.last() == Some(&"") {
        fields.pop();
    }
    fields
}

fn parse_field<T: std::str::FromStr>(
    text: &str,
    tag: &'static str,
    what: &str,
) -> Result<T, ErrorKind> {
    text.trim().parse().map_err(|_| ErrorKind::MalformedLine {
        tag,
        reason: format!("non-numeric {what} {text:?}"),
    })
}

fn parse_instruction_header(rest: &str) -> Result<InstructionLine<'_>, ErrorKind> {
    let fields = split_fields(rest);
    if fields.len() != 6 {
        return Err(ErrorKind::MalformedLine {
            tag: "instruction",
            reason: format!("expected 6 fields, found {}", fields.len()),
        });
    }
    Ok(InstructionLine {
        line_num: parse_field(fields[0], "instruction", "line number")?,
        static_function: fields[1],
        bblock_id: fields[2],
        inst_id: fields[3],
        microop: parse_field(fields[4], "instruction", "microop")?,
        node_id: parse_field(fields[5], "instruction", "node id")?,
    })
}

/// Split a `name:loop_depth` basic-block id.
fn parse_basic_block_id(bblock_id: &str) -> Result<(&str, u32), ErrorKind> {
    let (name, depth) = bblock_id
        .split_once(':')
        .ok_or_else(|| ErrorKind::MalformedLine {
            tag: "instruction",
            reason: format!("basic block id {bblock_id:?} has no loop depth"),
        })?;
    let depth = parse_field(depth, "instruction", "loop depth")?;
    Ok((name, depth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_scanner_tracks_offsets() {
        let text = "first\nsecond\n";
        let mut scanner = TraceScanner::new(Cursor::new(text), 0, text.len() as u64);
        let mut buf = String::new();

        assert!(scanner.next_line(&mut buf).unwrap());
        assert_eq!(buf, "first\n");
        assert_eq!(scanner.offset(), 6);

        assert!(scanner.next_line(&mut buf).unwrap());
        assert_eq!(scanner.offset(), 13);

        assert!(!scanner.next_line(&mut buf).unwrap());
        assert_eq!(scanner.offset(), 13);
    }

    #[test]
    fn test_scanner_respects_start_offset() {
        let text = "line\n";
        let mut scanner = TraceScanner::new(Cursor::new(text), 100, 105);
        let mut buf = String::new();
        scanner.next_line(&mut buf).unwrap();
        assert_eq!(scanner.offset(), 105);
    }

    #[test]
    fn test_split_fields_drops_trailing_empty() {
        assert_eq!(split_fields("32,1.5,1,%x,"), vec!["32", "1.5", "1", "%x"]);
        assert_eq!(split_fields("32,1.5,1,%x"), vec!["32", "1.5", "1", "%x"]);
    }

    #[test]
    fn test_parse_basic_block_id() {
        assert_eq!(parse_basic_block_id("entry:0").unwrap(), ("entry", 0));
        assert_eq!(parse_basic_block_id("loop_body:3").unwrap(), ("loop_body", 3));
        assert!(parse_basic_block_id("nodepth").is_err());
    }

    #[test]
    fn test_instruction_header_field_count() {
        assert!(parse_instruction_header("5,top,entry:0,i0,27,0").is_ok());
        assert!(parse_instruction_header("5,top,entry:0,27,0").is_err());
    }
}
