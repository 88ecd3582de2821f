//! Microop constants for the instrumented IR.
//!
//! The trace encodes each dynamic instruction's opcode as a small integer
//! following the LLVM instruction numbering, with accelerator-specific
//! operations (DMA transfers, fences, trigonometric intrinsics) in a high
//! block. Only a handful of these drive builder behavior; the rest exist so
//! arbitrary instruction lines classify cleanly.

pub const LLVM_IR_MOVE: u8 = 0;
pub const LLVM_IR_RET: u8 = 1;
pub const LLVM_IR_BR: u8 = 2;
pub const LLVM_IR_SWITCH: u8 = 3;
pub const LLVM_IR_INDIRECT_BR: u8 = 4;
pub const LLVM_IR_INVOKE: u8 = 5;
pub const LLVM_IR_RESUME: u8 = 6;
pub const LLVM_IR_UNREACHABLE: u8 = 7;
pub const LLVM_IR_ADD: u8 = 8;
pub const LLVM_IR_FADD: u8 = 9;
pub const LLVM_IR_SUB: u8 = 10;
pub const LLVM_IR_FSUB: u8 = 11;
pub const LLVM_IR_MUL: u8 = 12;
pub const LLVM_IR_FMUL: u8 = 13;
pub const LLVM_IR_UDIV: u8 = 14;
pub const LLVM_IR_SDIV: u8 = 15;
pub const LLVM_IR_FDIV: u8 = 16;
pub const LLVM_IR_UREM: u8 = 17;
pub const LLVM_IR_SREM: u8 = 18;
pub const LLVM_IR_FREM: u8 = 19;
pub const LLVM_IR_SHL: u8 = 20;
pub const LLVM_IR_LSHR: u8 = 21;
pub const LLVM_IR_ASHR: u8 = 22;
pub const LLVM_IR_AND: u8 = 23;
pub const LLVM_IR_OR: u8 = 24;
pub const LLVM_IR_XOR: u8 = 25;
pub const LLVM_IR_ALLOCA: u8 = 26;
pub const LLVM_IR_LOAD: u8 = 27;
pub const LLVM_IR_STORE: u8 = 28;
pub const LLVM_IR_GET_ELEMENT_PTR: u8 = 29;
pub const LLVM_IR_FENCE: u8 = 30;
pub const LLVM_IR_ATOMIC_CMP_XCHG: u8 = 31;
pub const LLVM_IR_ATOMIC_RMW: u8 = 32;
pub const LLVM_IR_TRUNC: u8 = 33;
pub const LLVM_IR_ZEXT: u8 = 34;
pub const LLVM_IR_SEXT: u8 = 35;
pub const LLVM_IR_FP_TO_UI: u8 = 36;
pub const LLVM_IR_FP_TO_SI: u8 = 37;
pub const LLVM_IR_UI_TO_FP: u8 = 38;
pub const LLVM_IR_SI_TO_FP: u8 = 39;
pub const LLVM_IR_FP_TRUNC: u8 = 40;
pub const LLVM_IR_FP_EXT: u8 = 41;
pub const LLVM_IR_PTR_TO_INT: u8 = 42;
pub const LLVM_IR_INT_TO_PTR: u8 = 43;
pub const LLVM_IR_BIT_CAST: u8 = 44;
pub const LLVM_IR_ADDR_SPACE_CAST: u8 = 45;
pub const LLVM_IR_ICMP: u8 = 46;
pub const LLVM_IR_FCMP: u8 = 47;
pub const LLVM_IR_PHI: u8 = 48;
pub const LLVM_IR_CALL: u8 = 49;
pub const LLVM_IR_SELECT: u8 = 50;
pub const LLVM_IR_DMA_FENCE: u8 = 97;
pub const LLVM_IR_DMA_STORE: u8 = 98;
pub const LLVM_IR_DMA_LOAD: u8 = 99;
pub const LLVM_IR_INDEX_ADD: u8 = 100;
pub const LLVM_IR_SILENT_STORE: u8 = 101;
pub const LLVM_IR_SINE: u8 = 102;
pub const LLVM_IR_COSINE: u8 = 103;

/// Function call.
pub fn is_call_op(microop: u8) -> bool {
    microop == LLVM_IR_CALL
}

/// Function return.
pub fn is_ret_op(microop: u8) -> bool {
    microop == LLVM_IR_RET
}

/// Any DMA operation, fences included.
pub fn is_dma_op(microop: u8) -> bool {
    matches!(
        microop,
        LLVM_IR_DMA_LOAD | LLVM_IR_DMA_STORE | LLVM_IR_DMA_FENCE
    )
}

/// DMA transfer into accelerator-visible memory.
pub fn is_dma_load(microop: u8) -> bool {
    microop == LLVM_IR_DMA_LOAD
}

/// DMA transfer out of accelerator-visible memory.
pub fn is_dma_store(microop: u8) -> bool {
    microop == LLVM_IR_DMA_STORE
}

/// DMA synchronization barrier.
pub fn is_dma_fence(microop: u8) -> bool {
    microop == LLVM_IR_DMA_FENCE
}

pub fn is_phi_op(microop: u8) -> bool {
    microop == LLVM_IR_PHI
}

pub fn is_load_op(microop: u8) -> bool {
    microop == LLVM_IR_LOAD
}

pub fn is_store_op(microop: u8) -> bool {
    microop == LLVM_IR_STORE
}

pub fn is_gep_op(microop: u8) -> bool {
    microop == LLVM_IR_GET_ELEMENT_PTR
}

/// Floating-point arithmetic, including the trigonometric intrinsics.
pub fn is_fp_op(microop: u8) -> bool {
    matches!(
        microop,
        LLVM_IR_FADD
            | LLVM_IR_FSUB
            | LLVM_IR_FMUL
            | LLVM_IR_FDIV
            | LLVM_IR_FREM
            | LLVM_IR_SINE
            | LLVM_IR_COSINE
    )
}

/// Trigonometric intrinsics are lowered as calls in the trace but are not
/// treated as called functions.
pub fn is_trig_op(microop: u8) -> bool {
    matches!(microop, LLVM_IR_SINE | LLVM_IR_COSINE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dma_classification() {
        assert!(is_dma_op(LLVM_IR_DMA_LOAD));
        assert!(is_dma_op(LLVM_IR_DMA_STORE));
        assert!(is_dma_op(LLVM_IR_DMA_FENCE));
        assert!(!is_dma_op(LLVM_IR_LOAD));
        assert!(is_dma_load(LLVM_IR_DMA_LOAD));
        assert!(!is_dma_load(LLVM_IR_DMA_STORE));
    }

    #[test]
    fn test_fp_classification() {
        assert!(is_fp_op(LLVM_IR_FADD));
        assert!(is_fp_op(LLVM_IR_SINE));
        assert!(!is_fp_op(LLVM_IR_ADD));
        assert!(is_trig_op(LLVM_IR_COSINE));
        assert!(!is_trig_op(LLVM_IR_FMUL));
    }
}
