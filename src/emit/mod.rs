//! Instruction stream synthesis: opcodes and the ordering-checked builder.

pub mod builder;
pub mod instruction;

pub use builder::{BdWrite, InstructionStreamBuilder, TensorSlice};
pub use instruction::{Direction, Instruction, InstructionStream};
