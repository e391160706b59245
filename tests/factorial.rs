use asmtwo::{
    bytecode,
    emulator::{Emulator, FlatMemory, TestIo},
    instruction::Register,
    symbolic,
};

use slog::{o, Drain, Logger};
use slog_term::{FullFormat, TermDecorator};

fn compile_program() -> bytecode::Program {
    let source_code = include_str!("factorial.a2s");

    let program = symbolic::Program::parse(source_code)
        .expect("could not parse the source code");

    program.compile()
        .expect("could not compile the program")
}

#[test]
fn test_factorial() {
    let program = compile_program();

    let decorator = TermDecorator::new().build();
    let drain = FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let logger = Logger::root(drain, o!());

    for (n, expected) in vec![(0, 1), (1, 1), (5, 120), (8, 40320)] {
        let mut io = TestIo::with_input(vec![n]);
        let memory = FlatMemory::with_program(&program.bytes);
        let mut emulator = Emulator::with_logger(memory, &mut io, logger.clone());

        let cycles = emulator.run_for(10_000)
            .expect("error while executing the program");

        assert!(emulator.halted);
        assert!(cycles > 0);
        assert_eq!(emulator.context.r[Register::SP.index()], 0);
        assert_eq!(emulator.context.r[Register::A.index()], n);

        assert_eq!(io.output(), &[(2, expected)]);
    }
}
