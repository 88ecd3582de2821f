// Example: building a dynamic data dependence graph from an execution trace.
//
// Demonstrates the full build pipeline: scanning a trace, constructing the
// graph, and inspecting the resulting nodes, edges, and array registrations.
//
// Run with: cargo run --example build_dddg [-- path/to/dynamic_trace]
//
// Without an argument, an embedded sample trace is used. Gzipped traces can
// be fed by wrapping a gz reader in a BufReader before handing it to the
// scanner.

use dddg::{
    BuildConfig, BuildOutcome, DddgBuilder, EdgeKind, Program, SourceManager, TraceScanner,
};
use std::io::Cursor;

/// A small trace: a caller allocates an array, passes it to a helper that
/// indexes and stores into it, then reads the result back after a DMA
/// round-trip.
const SAMPLE_TRACE: &str = "\
0,1,top,entry:0,alloca_buf,26,0
r,64,4096,1,buf,
0,2,top,entry:0,call_fill,49,1
2,64,0,0,fill,
1,64,4096,1,buf,
f,64,4096,1,arr,
0,3,fill,body:1,gep_elem,29,2
1,64,4096,1,arr,
r,64,4096,1,%elem,
0,4,fill,body:1,store_elem,28,3
2,32,4096,1,%elem,
1,32,42,0,42,
0,5,fill,body:1,ret_fill,1,4
r,32,0,1,%rv,
0,6,top,entry:0,dma_out,98,5
1,64,0,0,dmaStore,
2,64,4096,0,base,
3,64,0,0,offset,
4,64,4,0,length,
r,32,0,1,%t0,
0,7,top,entry:0,load_back,27,6
1,32,4096,1,%elem2,
r,32,42,1,%res,
0,8,top,entry:0,ret_top,1,7
r,32,0,1,%rv2,
";

fn main() {
    tracing_subscriber::fmt::init();

    let text = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("cannot read trace {path}: {e}")),
        None => SAMPLE_TRACE.to_string(),
    };

    let mut program = Program::new();
    let mut src = SourceManager::new();
    let mut builder = DddgBuilder::new(&mut program, &mut src, BuildConfig::default());
    let mut scanner = TraceScanner::new(Cursor::new(&text), 0, text.len() as u64);

    let outcome = match builder.build(&mut scanner) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("build error: {e}");
            std::process::exit(1);
        }
    };
    let stats = builder.stats();

    match outcome {
        BuildOutcome::Complete { next_offset } => {
            println!("build complete, consumed {next_offset} bytes");
        }
        BuildOutcome::EndOfTrace => {
            println!("reached end of trace without instructions");
            return;
        }
    }

    println!(
        "\nstats: {}",
        serde_json::to_string_pretty(&stats).expect("stats serialize")
    );
    let functions: Vec<&str> = program.function_names().collect();
    println!("functions traced: {functions:?}");
    println!("edges recorded: {}", program.num_edges());

    println!("\nnodes:");
    for node in program.nodes() {
        let function = node
            .static_function
            .map(|f| src.function_name(f))
            .unwrap_or("?");
        let label = node.array_label.as_deref().unwrap_or("-");
        print!(
            "  [{}] microop={} fn={} line={} depth={} invocation={} array={}",
            node.id,
            node.microop,
            function,
            node.line_num,
            node.loop_depth,
            node.dynamic_invocation,
            label
        );
        if let Some(access) = node.mem_access() {
            print!(" access={access}");
        }
        if let Some(dma) = node.dma_transfer() {
            print!(
                " dma=base {:#x} +{}..+{} len {}",
                dma.base, dma.src_offset, dma.dst_offset, dma.size
            );
        }
        println!();
    }

    println!("\nedges:");
    for edge in program.edges() {
        let kind = match edge.kind {
            EdgeKind::Register { param } => format!("reg(op {param})"),
            EdgeKind::Memory => "mem".to_string(),
            EdgeKind::Control => "ctrl".to_string(),
        };
        println!("  {} -> {} [{}]", edge.source, edge.sink, kind);
    }

    println!("\narray bases:");
    for (name, addr) in program.array_bases() {
        println!("  {name} @ {addr:#x}");
    }
}
