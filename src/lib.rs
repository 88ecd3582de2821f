//! Dynamic data dependence graph (DDDG) construction for accelerator
//! simulation.
//!
//! This crate consumes the line-oriented dynamic execution trace emitted by
//! an instrumented compiler pass and builds a directed graph whose nodes are
//! dynamic instruction instances and whose edges encode register data flow,
//! byte-granular memory aliasing, and call/DMA control ordering.
//!
//! The entry point is [`DddgBuilder`]: give it a [`Program`] sink, a
//! [`SourceManager`] for symbol interning, and a [`TraceScanner`] positioned
//! over the trace, and drive it with [`DddgBuilder::build`].
//!
//! ```no_run
//! use dddg::{BuildConfig, DddgBuilder, Program, SourceManager, TraceScanner};
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = File::open("dynamic_trace")?;
//! let size = file.metadata()?.len();
//! let mut scanner = TraceScanner::new(BufReader::new(file), 0, size);
//!
//! let mut program = Program::new();
//! let mut src = SourceManager::new();
//! let mut builder = DddgBuilder::new(&mut program, &mut src, BuildConfig::default());
//! let outcome = builder.build(&mut scanner)?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod error;
pub mod opcode;
pub mod program;
pub mod progress;
pub mod source;

pub use builder::{
    value, BuildConfig, BuildOutcome, BuildStats, DddgBuilder, TraceScanner, ADDR_MASK,
    BITS_PER_BYTE, MAX_LOOP_DEPTH,
};
pub use error::{BuildError, ErrorKind};
pub use program::{
    Addr, CallArgMap, DmaTransfer, Edge, EdgeKind, ExecNode, MemAccess, MemValue, NodeAccess,
    NodeId, Program,
};
pub use progress::ProgressTracker;
pub use source::{
    BasicBlockId, DynamicFunction, DynamicVariable, FunctionId, InstructionId, LabelId,
    SourceManager, UniqueLabel, VariableId,
};
