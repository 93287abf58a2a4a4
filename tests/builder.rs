mod utils;

use symtaint::{
    engine::Destination, AnalysisError, Inst, Location, Mnemonic, Operand, OperandShape, Register,
    Snapshot,
};
use utils::*;

const CMOVO: &str = "(ite (= of_t1_v0 (_ bv1 1)) rbx_t1_v0 rax_t1_v0)";

fn cmovo_rax_rbx() -> symtaint::InstructionBuilder {
    builder(
        Mnemonic::Cmovo,
        "cmovo rax, rbx",
        vec![reg(Register::Rax), reg(Register::Rbx)],
    )
}

#[test]
fn taken_conditional_move_copies_source_taint() {
    init();

    let session = session_with_tainted(&[Register::Rbx]);
    let concrete = flags(true)
        .with_register(Register::Rax, 5)
        .with_register(Register::Rbx, 9);

    let record = session
        .process_with(THREAD, &cmovo_rax_rbx(), &concrete)
        .unwrap();

    assert_eq!(record.elements.len(), 1);
    assert_eq!(record.elements[0].expression, CMOVO);
    assert!(record.elements[0].tainted);
    assert!(session.is_register_tainted(THREAD, Register::Rax));

    let rax = Location::register(THREAD, Register::Rax);
    assert_eq!(session.current_version(rax), 1);

    session.with_trace(|trace| {
        let inst = trace.last().unwrap();

        assert_eq!(inst.address(), ADDRESS);
        assert_eq!(inst.next_address(), Some(ADDRESS + 4));
        assert_eq!(
            inst.elements()[0].destination(),
            &Destination::Register {
                thread: THREAD,
                register: Register::Rax,
                size: 8,
                version: 1,
            }
        );
    });
}

#[test]
fn conditional_move_not_taken_keeps_destination_taint() {
    init();

    let tainted_destination = session_with_tainted(&[Register::Rax]);
    let record = tainted_destination
        .process_with(THREAD, &cmovo_rax_rbx(), &flags(false))
        .unwrap();

    assert_eq!(record.elements[0].expression, CMOVO);
    assert!(!record.elements[0].tainted);
    assert!(tainted_destination.is_register_tainted(THREAD, Register::Rax));

    let tainted_source = session_with_tainted(&[Register::Rbx]);
    let record = tainted_source
        .process_with(THREAD, &cmovo_rax_rbx(), &flags(false))
        .unwrap();

    assert_eq!(record.elements[0].expression, CMOVO);
    assert!(!tainted_source.is_register_tainted(THREAD, Register::Rax));
}

#[test]
fn conditional_move_from_memory_follows_any_tainted_byte() {
    init();

    let session = symtaint::Session::new(symtaint::SessionOptions {
        taint_sources: vec![symtaint::TaintSource::Memory {
            address: 0x7000,
            size: 1,
        }],
        ..Default::default()
    });
    let cmovo = builder(
        Mnemonic::Cmovo,
        "cmovo ecx, dword ptr [0x6ffe]",
        vec![Operand::register(Register::Rcx, 4), Operand::memory(0x6ffe, 4)],
    );

    let record = session.process_with(THREAD, &cmovo, &flags(true)).unwrap();

    assert_eq!(
        record.elements[0].expression,
        "(ite (= of_t1_v0 (_ bv1 1)) \
         (concat mem_0x7001_v0 (concat mem_0x7000_v0 (concat mem_0x6fff_v0 mem_0x6ffe_v0))) \
         ((_ extract 31 0) rcx_t1_v0))"
    );
    assert!(session.is_register_tainted(THREAD, Register::Rcx));
}

#[test]
fn conditional_move_rejects_shapes_without_encoding() {
    init();

    let session = session_with_tainted(&[Register::Rbx]);
    session
        .process_with(THREAD, &cmovo_rax_rbx(), &flags(true))
        .unwrap();

    let before = session.checkpoint();

    let shapes = [
        ("cmovo rax, 1", vec![reg(Register::Rax), Operand::immediate(1, 4)]),
        ("cmovo [0x1000], 1", vec![Operand::memory(0x1000, 8), Operand::immediate(1, 4)]),
        ("cmovo [0x1000], rbx", vec![Operand::memory(0x1000, 8), reg(Register::Rbx)]),
    ];

    for (disassembly, operands) in shapes {
        let result = session.process_with(
            THREAD,
            &builder(Mnemonic::Cmovo, disassembly, operands),
            &flags(true),
        );

        assert_eq!(
            result,
            Err(AnalysisError::UnsupportedOperandShape {
                mnemonic: Mnemonic::Cmovo,
                disassembly: disassembly.to_owned(),
            })
        );
    }

    let after = session.checkpoint();

    assert_eq!(engine_state(&after), engine_state(&before));
    assert_eq!(after.statistics.discarded, 3);
    assert_eq!(after.statistics.instructions, 1);
}

#[test]
fn handlers_refuse_shapes_other_than_the_configured_one() {
    init();

    let session = session_with_tainted(&[]);
    let cmovo = cmovo_rax_rbx();

    let result = session.with_processor(THREAD, &flags(true), |ap| {
        let mut inst = Inst::new(THREAD, ADDRESS, "cmovo rax, rbx");
        cmovo.handle(OperandShape::RegMem, ap, &mut inst)
    });

    assert!(matches!(
        result,
        Err(AnalysisError::UnsupportedOperandShape { .. })
    ));
}

#[test]
fn mismatched_operand_widths_change_nothing() {
    init();

    let session = session_with_tainted(&[Register::Rbx]);
    let before = session.checkpoint();

    let cmovo = builder(
        Mnemonic::Cmovo,
        "cmovo rax, ebx",
        vec![reg(Register::Rax), Operand::register(Register::Rbx, 4)],
    );

    let result = session.process_with(THREAD, &cmovo, &flags(true));

    assert!(matches!(
        result,
        Err(AnalysisError::ExpressionWidthMismatch { .. })
    ));
    assert_eq!(engine_state(&session.checkpoint()), engine_state(&before));
}

#[test]
fn unknown_register_ids_are_rejected() {
    init();

    let session = session_with_tainted(&[]);
    let cmovo = builder(
        Mnemonic::Cmovo,
        "cmovo rax, xmm0",
        vec![reg(Register::Rax), Operand::new(symtaint::OperandKind::Register, 99, 8)],
    );

    assert_eq!(
        session.process_with(THREAD, &cmovo, &flags(true)),
        Err(AnalysisError::UnknownRegister(99))
    );
}

#[test]
fn processing_requires_a_complete_builder() {
    init();

    let session = session_with_tainted(&[]);
    let incomplete = symtaint::InstructionBuilder::new(Mnemonic::Cmovo)
        .address(ADDRESS)
        .disassembly("cmovo rax, rbx");

    assert_eq!(
        session.process_with(THREAD, &incomplete, &flags(true)),
        Err(AnalysisError::IncompleteBuilderConfiguration("operands"))
    );
    assert!(session.with_trace(|t| t.is_empty()));
}

#[test]
fn conditional_moves_share_one_protocol() {
    init();

    let session = session_with_tainted(&[Register::Rbx]);
    let concrete = Snapshot::new()
        .with_flag(Register::Zf, false)
        .with_flag(Register::Cf, true);

    let cmovne = builder(
        Mnemonic::Cmovne,
        "cmovne rax, rbx",
        vec![reg(Register::Rax), reg(Register::Rbx)],
    );
    let record = session.process_with(THREAD, &cmovne, &concrete).unwrap();

    assert_eq!(
        record.elements[0].expression,
        "(ite (= (bvnot zf_t1_v0) (_ bv1 1)) rbx_t1_v0 rax_t1_v0)"
    );
    assert!(session.is_register_tainted(THREAD, Register::Rax));

    let cmova = builder(
        Mnemonic::Cmova,
        "cmova rcx, rbx",
        vec![reg(Register::Rcx), reg(Register::Rbx)],
    );
    session.process_with(THREAD, &cmova, &concrete).unwrap();

    assert!(!session.is_register_tainted(THREAD, Register::Rcx));
}

#[test]
fn moves_copy_or_clear_taint() {
    init();

    let session = session_with_tainted(&[Register::Rbx, Register::Rcx]);
    let concrete = Snapshot::new();

    let store = builder(
        Mnemonic::Mov,
        "mov qword ptr [0x2000], rbx",
        vec![Operand::memory(0x2000, 8), reg(Register::Rbx)],
    );
    let record = session.process_with(THREAD, &store, &concrete).unwrap();

    assert!(record.elements[0].tainted);
    assert!(session.is_memory_tainted(0x2007, 1));
    assert!(!session.is_memory_tainted(0x2008, 1));

    let load = builder(
        Mnemonic::Mov,
        "mov eax, dword ptr [0x2004]",
        vec![Operand::register(Register::Rax, 4), Operand::memory(0x2004, 4)],
    );
    session.process_with(THREAD, &load, &concrete).unwrap();

    assert!(session.is_register_tainted(THREAD, Register::Rax));

    let constant = builder(
        Mnemonic::Mov,
        "mov rcx, -1",
        vec![reg(Register::Rcx), Operand::immediate(0xffff_ffff, 4)],
    );
    let record = session.process_with(THREAD, &constant, &concrete).unwrap();

    assert_eq!(record.elements[0].expression, "(_ bv18446744073709551615 64)");
    assert!(!session.is_register_tainted(THREAD, Register::Rcx));
}

#[test]
fn addition_writes_result_and_flags() {
    init();

    let session = session_with_tainted(&[Register::Rbx]);
    let add = builder(
        Mnemonic::Add,
        "add rax, rbx",
        vec![reg(Register::Rax), reg(Register::Rbx)],
    );

    let record = session.process_with(THREAD, &add, &Snapshot::new()).unwrap();

    assert_eq!(record.elements.len(), 7);
    assert_eq!(record.elements[0].expression, "(bvadd rax_t1_v0 rbx_t1_v0)");
    assert!(record.elements.iter().all(|e| e.tainted));

    for flag in [
        Register::Cf,
        Register::Of,
        Register::Sf,
        Register::Zf,
        Register::Af,
        Register::Pf,
    ] {
        assert!(session.is_register_tainted(THREAD, flag));
        assert_eq!(
            session.current_version(Location::register(THREAD, flag)),
            1
        );
    }

    assert_eq!(session.statistics().expressions, 7);
}

#[test]
fn narrow_immediates_are_sign_extended() {
    init();

    let session = session_with_tainted(&[]);
    let sub = builder(
        Mnemonic::Sub,
        "sub eax, -1",
        vec![Operand::register(Register::Rax, 4), Operand::immediate(0xff, 1)],
    );

    let record = session.process_with(THREAD, &sub, &Snapshot::new()).unwrap();

    assert_eq!(
        record.elements[0].expression,
        "(bvsub ((_ extract 31 0) rax_t1_v0) (_ bv4294967295 32))"
    );
}

#[test]
fn comparison_only_writes_flags() {
    init();

    let session = session_with_tainted(&[]);
    let cmp = builder(
        Mnemonic::Cmp,
        "cmp qword ptr [0x3000], 0",
        vec![Operand::memory(0x3000, 8), Operand::immediate(0, 1)],
    );

    let record = session.process_with(THREAD, &cmp, &Snapshot::new()).unwrap();

    assert_eq!(record.elements.len(), 6);
    assert_eq!(session.current_version(Location::Memory(0x3000)), 0);
    assert_eq!(
        session.current_version(Location::register(THREAD, Register::Zf)),
        1
    );
}

#[test]
fn xor_with_itself_clears_value_and_taint() {
    init();

    let session = session_with_tainted(&[Register::Rax]);
    let xor = builder(
        Mnemonic::Xor,
        "xor rax, rax",
        vec![reg(Register::Rax), reg(Register::Rax)],
    );

    let record = session.process_with(THREAD, &xor, &Snapshot::new()).unwrap();

    assert_eq!(record.elements.len(), 6);
    assert_eq!(record.elements[0].expression, "(_ bv0 64)");
    assert!(record.elements.iter().all(|e| !e.tainted));
    assert!(!session.is_register_tainted(THREAD, Register::Rax));
    assert_eq!(
        session.current_version(Location::register(THREAD, Register::Af)),
        0
    );
}

#[test]
fn logic_into_memory_keeps_memory_taint() {
    init();

    let session = symtaint::Session::new(symtaint::SessionOptions {
        taint_sources: vec![symtaint::TaintSource::Memory {
            address: 0x5000,
            size: 1,
        }],
        ..Default::default()
    });
    let and = builder(
        Mnemonic::And,
        "and word ptr [0x5000], 0xff",
        vec![Operand::memory(0x5000, 2), Operand::immediate(0xff, 2)],
    );

    let record = session.process_with(THREAD, &and, &Snapshot::new()).unwrap();

    assert_eq!(
        record.elements[0].expression,
        "(bvand (concat mem_0x5001_v0 mem_0x5000_v0) (_ bv255 16))"
    );
    assert!(session.is_memory_tainted(0x5001, 1));
    assert_eq!(session.current_version(Location::Memory(0x5001)), 1);
}

#[test]
fn element_ids_increase_across_instructions() {
    init();

    let session = session_with_tainted(&[]);
    let concrete = flags(true);

    session.process_with(THREAD, &cmovo_rax_rbx(), &concrete).unwrap();
    session
        .process_with(
            THREAD,
            &builder(
                Mnemonic::Add,
                "add rax, 1",
                vec![reg(Register::Rax), Operand::immediate(1, 1)],
            ),
            &concrete,
        )
        .unwrap();
    session.process_with(THREAD, &cmovo_rax_rbx(), &concrete).unwrap();

    let ids = session.with_trace(|t| t.elements().map(|e| e.id()).collect::<Vec<_>>());

    assert_eq!(ids, (0..ids.len() as u64).collect::<Vec<_>>());
    assert_eq!(ids.len(), 1 + 7 + 1);
    assert_eq!(
        session.current_version(Location::register(THREAD, Register::Rax)),
        3
    );
}

#[test]
fn unrecorded_processing_still_returns_the_instruction() {
    init();

    let session = session_with_tainted(&[]);
    let inst = process(&session, &cmovo_rax_rbx(), &flags(false)).unwrap();

    assert_eq!(inst.number_of_elements(), 1);
    assert_eq!(inst.next_address(), Some(ADDRESS + 4));
    assert!(!inst.is_tainted());
    assert!(session.with_trace(|t| t.is_empty()));
    assert_eq!(session.statistics().instructions, 1);
}

#[test]
fn out_of_range_operand_sizes_are_rejected_without_side_effects() {
    init();

    let session = session_with_tainted(&[Register::Rbx]);
    let before = session.checkpoint();

    let huge_register = builder(
        Mnemonic::Mov,
        "mov rax, 1",
        vec![
            Operand::register(Register::Rax, 0x2000_0000),
            Operand::immediate(1, 1),
        ],
    );
    let huge_memory = builder(
        Mnemonic::Mov,
        "mov rax, [0x1000]",
        vec![reg(Register::Rax), Operand::memory(0x1000, 1_000_000)],
    );

    for oversized in [&huge_register, &huge_memory] {
        assert!(matches!(
            session.process_with(THREAD, oversized, &Snapshot::new()),
            Err(AnalysisError::ExpressionWidthMismatch { .. })
        ));
        assert_eq!(engine_state(&session.checkpoint()), engine_state(&before));
    }

    let mov = builder(
        Mnemonic::Mov,
        "mov rax, rbx",
        vec![reg(Register::Rax), reg(Register::Rbx)],
    );
    let record = session.process_with(THREAD, &mov, &Snapshot::new()).unwrap();

    assert_eq!(record.elements[0].expression, "rbx_t1_v0");
    assert_eq!(session.statistics().discarded, 2);
}

fn push_rbx() -> symtaint::InstructionBuilder {
    builder(
        Mnemonic::Push,
        "push rbx",
        vec![Operand::memory(0x7ff8, 8), reg(Register::Rbx)],
    )
}

#[test]
fn push_moves_the_stack_pointer_and_stores_the_source() {
    init();

    let session = session_with_tainted(&[Register::Rbx]);
    let record = session.process_with(THREAD, &push_rbx(), &Snapshot::new()).unwrap();

    assert_eq!(record.elements.len(), 2);
    assert_eq!(record.elements[0].expression, "(bvsub rsp_t1_v0 (_ bv8 64))");
    assert!(!record.elements[0].tainted);
    assert_eq!(record.elements[1].expression, "rbx_t1_v0");
    assert!(record.elements[1].tainted);

    assert!(session.is_memory_tainted(0x7ff8, 8));
    assert!(!session.is_memory_tainted(0x7ff0, 8));
    assert!(!session.is_register_tainted(THREAD, Register::Rsp));
    assert_eq!(
        session.current_version(Location::register(THREAD, Register::Rsp)),
        1
    );
    assert_eq!(session.current_version(Location::Memory(0x7fff)), 1);
}

#[test]
fn pop_restores_a_pushed_value_and_its_taint() {
    init();

    let session = session_with_tainted(&[Register::Rbx]);
    session.process_with(THREAD, &push_rbx(), &Snapshot::new()).unwrap();

    let pop = builder(
        Mnemonic::Pop,
        "pop rcx",
        vec![reg(Register::Rcx), Operand::memory(0x7ff8, 8)],
    );
    let record = session.process_with(THREAD, &pop, &Snapshot::new()).unwrap();

    assert_eq!(record.elements.len(), 2);
    assert_eq!(record.elements[0].expression, "(bvadd rsp_t1_v1 (_ bv8 64))");
    assert!(record.elements[1].expression.contains("mem_0x7ff8_v1"));
    assert!(record.elements[1].tainted);
    assert!(session.is_register_tainted(THREAD, Register::Rcx));
    assert_eq!(
        session.current_version(Location::register(THREAD, Register::Rsp)),
        2
    );
}

#[test]
fn pushing_an_immediate_clears_the_slot() {
    init();

    let session = session_with_tainted(&[Register::Rbx]);
    session.process_with(THREAD, &push_rbx(), &Snapshot::new()).unwrap();

    let push = builder(
        Mnemonic::Push,
        "push -1",
        vec![Operand::memory(0x7ff8, 8), Operand::immediate(0xff, 1)],
    );
    let record = session.process_with(THREAD, &push, &Snapshot::new()).unwrap();

    assert_eq!(record.elements[1].expression, "(_ bv18446744073709551615 64)");
    assert!(!record.elements[1].tainted);
    assert!(!session.is_memory_tainted(0x7ff8, 8));
}

#[test]
fn stack_operations_reject_other_shapes() {
    init();

    let session = session_with_tainted(&[]);
    let before = session.checkpoint();

    let push = builder(
        Mnemonic::Push,
        "push rbx",
        vec![reg(Register::Rsp), reg(Register::Rbx)],
    );
    let pop = builder(
        Mnemonic::Pop,
        "pop qword ptr [0x5000]",
        vec![Operand::memory(0x5000, 8), reg(Register::Rsp)],
    );

    for rejected in [&push, &pop] {
        assert!(matches!(
            session.process_with(THREAD, rejected, &Snapshot::new()),
            Err(AnalysisError::UnsupportedOperandShape { .. })
        ));
    }
    assert_eq!(engine_state(&session.checkpoint()), engine_state(&before));
}
