pub mod bytecode;
pub mod compiler;
pub mod disasm; // 디스어셈블러
pub mod machine; // machine/ 디렉토리
pub mod utils;
pub mod value;

pub use bytecode::{Keyword, Module, NamedClosure, Opcode, ProgramShape};
pub use compiler::{CompileError, CompileErrorKind, Compiler};
pub use machine::{
    DumpEntry, Flow, MachineConfig, Outcome, Stats, Vm, VmError, VmErrorKind, VmResult, err,
};
pub use value::{Callable, HostFn, Symbol, Value, ValueError};
