//! Reference CPU interpreter for IL
//!
//! Executes compiled methods without a GPU, with the same arithmetic as the
//! SPIR-V lowering. Kernels are dispatched over a grid of invocations;
//! `RwBuffer<T>` and `Texture2D<T>` fields read and write host-bound
//! resources by their `Namespace.Type.Field` name.

mod arithmetic;
mod interpreter;
mod value;

pub use interpreter::{Interpreter, InterpreterOptions, Invocation};
pub use value::{Resource, Value};
