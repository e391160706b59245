use asmtwo::{
    bytecode::Program,
    emulator::{Emulator, FlatMemory, TestIo},
    symbolic,
};

fn compile_program() -> Program {
    symbolic::Program::parse(include_str!("sum.a2s"))
        .expect("could not parse sum.a2s")
        .compile()
        .expect("could not compile sum.a2s")
}

#[test]
fn test_sum_compile() {
    let p = compile_program();

    assert_eq!(p.label_defines["loop"], 4);
    assert_eq!(p.label_defines["done"], 18);
    assert_eq!(&p.bytes[..4], &[0xDE, 0x01, 0x00, 0x00]);
    assert_eq!(&p.bytes[4..8], &[0xDE, 0x30, 0x00, 0x01]);
}

#[test]
fn test_sum_emulate_program() {
    let p = compile_program();

    let cases = vec![
        (vec![1, 2, 3, 4, 0], 1 + 2 + 3 + 4),
        (vec![0], 0),
        (vec![1, 10, 100, 1000, 10000, 0], 11111),
        (vec![0xFFFF, 2, 0], 1),
    ];

    for (input, sum) in cases {
        let mut io = TestIo::with_input(input);

        let mut e = Emulator::new(FlatMemory::with_program(&p.bytes), &mut io);
        e.run().unwrap();

        assert_eq!(io.into_output(), vec![(2, sum)]);
    }
}
