use std::collections::HashMap;

use anyhow::Result;
use pretty_assertions::assert_eq;

use ncs_decompiler::asm::Assembler;
use ncs_decompiler::decode::{BinaryOp, Constant, Op};
use ncs_decompiler::prototype::SubroutineRole;
use ncs_decompiler::types::OperandTypes;
use ncs_decompiler::{
    ActionTable, FrameTyper, InferenceConfig, NcsFile, Position, Program, PrototypeEngine,
    PrototypeReport, PrototypeStatus, StateArena, TypeTag,
};

fn int(v: i32) -> Op {
    Op::Const(Constant::Int(v))
}

/// Round-trip through the binary format, as the tool reads it from disk.
fn load(asm: &Assembler) -> Result<(Program, HashMap<String, Position>)> {
    let file = NcsFile::parse(asm.to_ncs_bytes()?)?;
    Ok((Program::from_file(&file)?, asm.labels()?))
}

fn strict() -> InferenceConfig {
    InferenceConfig {
        strict: true,
        ..Default::default()
    }
}

/// ```text
/// int g = 5;
/// int add(int a, int b) { return a + b; }
/// vector where() { return GetPosition(OBJECT_SELF); }
/// void main() { PrintInteger(add(2, 3)); where(); }
/// ```
fn script_with_globals() -> Assembler {
    let mut asm = Assembler::new();
    asm.jsr("globals").op(Op::Retn);
    asm.label("globals")
        .op(Op::RsAdd(TypeTag::Int))
        .op(int(5))
        .op(Op::CpDownSp { offset: -8, size: 4 })
        .op(Op::MovSp(-4))
        .op(Op::SaveBp)
        .jsr("main")
        .op(Op::RestoreBp)
        .op(Op::MovSp(-4))
        .op(Op::Retn);
    asm.label("main")
        .op(Op::RsAdd(TypeTag::Int))
        .op(int(2))
        .op(int(3))
        .jsr("add")
        .op(Op::Action { routine: 4, argc: 1 })
        .op(Op::RsAdd(TypeTag::Float))
        .op(Op::RsAdd(TypeTag::Float))
        .op(Op::RsAdd(TypeTag::Float))
        .jsr("where")
        .op(Op::MovSp(-12))
        .op(Op::Retn);
    asm.label("add")
        .op(Op::CpTopSp { offset: -8, size: 4 })
        .op(Op::CpTopSp { offset: -8, size: 4 })
        .op(Op::Binary {
            op: BinaryOp::Add,
            operands: OperandTypes::from_code(0x20, 0).expect("int pair"),
        })
        .op(Op::CpDownSp {
            offset: -16,
            size: 4,
        })
        .op(Op::MovSp(-4))
        .op(Op::MovSp(-8))
        .op(Op::Retn);
    asm.label("where")
        .op(Op::Const(Constant::Object(0)))
        .op(Op::Action { routine: 27, argc: 1 })
        .op(Op::CpDownSp {
            offset: -24,
            size: 12,
        })
        .op(Op::MovSp(-12))
        .op(Op::Retn);
    asm.label("orphan").jsr("orphan").op(Op::Retn);
    asm
}

#[test]
fn structural_prototypes_for_clean_script() -> Result<()> {
    let (program, l) = load(&script_with_globals())?;
    assert_eq!(program.globals_entry(), Some(l["globals"]));
    assert_eq!(program.main_entry(), Some(l["main"]));

    let actions = ActionTable::bundled()?;
    let mut states = StateArena::new(&program);
    let mut engine = PrototypeEngine::new(
        &program,
        &mut states,
        FrameTyper::new(&actions),
        &actions,
        strict(),
    );
    engine.run();
    assert!(engine.diagnostics().is_empty());

    let proto = |name: &str| {
        let s = states.get(l[name]).expect("subroutine state");
        (s.status(), s.return_type(), s.param_count())
    };
    let done = PrototypeStatus::Prototyped;
    assert_eq!(proto("globals"), (done, Some(TypeTag::Void), 0));
    assert_eq!(proto("main"), (done, Some(TypeTag::Void), 0));
    assert_eq!(proto("add"), (done, Some(TypeTag::Int), 2));
    assert_eq!(proto("where"), (done, Some(TypeTag::Vector), 0));
    assert_eq!(proto("orphan").0, PrototypeStatus::Unprototyped);
    Ok(())
}

#[test]
fn report_lists_every_subroutine() -> Result<()> {
    let (program, l) = load(&script_with_globals())?;
    let actions = ActionTable::bundled()?;
    let mut states = StateArena::new(&program);
    PrototypeEngine::new(
        &program,
        &mut states,
        FrameTyper::new(&actions),
        &actions,
        InferenceConfig::default(),
    )
    .run();

    let report = PrototypeReport::collect(&program, &states);
    assert_eq!(report.subroutines.len(), 5);

    let orphan = report
        .subroutines
        .iter()
        .find(|e| e.position == l["orphan"])
        .expect("orphan entry");
    assert!(!orphan.reachable);
    assert_eq!(orphan.status, PrototypeStatus::Unprototyped);
    assert_eq!(orphan.role, SubroutineRole::Subroutine);

    let yaml = report.to_yaml()?;
    assert!(yaml.contains("role: main"));
    assert!(yaml.contains("return_type: vector"));
    Ok(())
}

/// `helper` calls an engine routine missing from the table, so neither it nor
/// its caller can be typed structurally.
fn script_with_unknown_routine() -> Assembler {
    let mut asm = Assembler::new();
    asm.jsr("main").op(Op::Retn);
    asm.label("main")
        .op(int(1))
        .op(int(2))
        .op(int(3))
        .jsr("helper")
        .op(Op::Retn);
    asm.label("helper")
        .op(Op::Action {
            routine: 4000,
            argc: 0,
        })
        .op(Op::MovSp(-4))
        .op(Op::MovSp(-16))
        .op(Op::Retn);
    asm
}

#[test]
fn unresolved_subroutines_fall_back() -> Result<()> {
    let (program, l) = load(&script_with_unknown_routine())?;
    let actions = ActionTable::bundled()?;
    let mut states = StateArena::new(&program);
    let mut engine = PrototypeEngine::new(
        &program,
        &mut states,
        FrameTyper::new(&actions),
        &actions,
        strict(),
    );
    engine.run();

    let mut reported: Vec<Position> = engine.diagnostics().iter().map(|d| d.position).collect();
    reported.sort();
    assert_eq!(reported, vec![l["main"], l["helper"]]);

    // Three cells pushed at the call site, four released in the body.
    let helper = states.get(l["helper"]).expect("helper state");
    assert!(helper.is_prototyped());
    assert_eq!(helper.param_count(), 3);
    assert_eq!(helper.return_type(), Some(TypeTag::Void));
    assert_eq!(helper.params(), &[TypeTag::Any; 3]);

    let main = states.get(l["main"]).expect("main state");
    assert_eq!(main.param_count(), 0);
    Ok(())
}

#[test]
fn lenient_mode_is_silent() -> Result<()> {
    let (program, _) = load(&script_with_unknown_routine())?;
    let actions = ActionTable::bundled()?;
    let mut states = StateArena::new(&program);
    let mut engine = PrototypeEngine::new(
        &program,
        &mut states,
        FrameTyper::new(&actions),
        &actions,
        InferenceConfig::default(),
    );
    engine.run();
    assert!(engine.diagnostics().is_empty());
    assert!(states.iter().all(|s| s.is_prototyped()));
    Ok(())
}

/// `DelayCommand(1.0, helper(1, 2))`: `helper` is only called from the
/// deferred body and releases two locals on top of its parameters.
fn script_with_deferred_call() -> Assembler {
    let mut asm = Assembler::new();
    asm.jsr("main").op(Op::Retn);
    asm.label("main")
        .op(Op::StoreState { bp: 0, sp: 0 })
        .jmp("after")
        .op(int(1))
        .op(int(2))
        .jsr("helper")
        .op(Op::Retn)
        .label("after")
        .op(Op::Retn);
    asm.label("helper")
        .op(Op::Action {
            routine: 4000,
            argc: 0,
        })
        .op(Op::MovSp(-16))
        .op(Op::Retn);
    asm
}

#[test]
fn deferred_calls_bound_the_fallback() -> Result<()> {
    let (program, l) = load(&script_with_deferred_call())?;
    let actions = ActionTable::bundled()?;
    let mut states = StateArena::new(&program);
    PrototypeEngine::new(
        &program,
        &mut states,
        FrameTyper::new(&actions),
        &actions,
        InferenceConfig::default(),
    )
    .run();

    let helper = states.get(l["helper"]).expect("helper state");
    assert!(helper.is_prototyped());
    assert_eq!(helper.param_count(), 2);

    let main = states.get(l["main"]).expect("main state");
    assert_eq!(main.status(), PrototypeStatus::Prototyped);
    assert_eq!(main.return_type(), Some(TypeTag::Void));
    Ok(())
}

#[test]
fn runaway_stack_growth_falls_back() -> Result<()> {
    let mut asm = Assembler::new();
    asm.jsr("main").op(Op::Retn);
    asm.label("main");
    for _ in 0..4 {
        asm.op(Op::MovSp(0x7FFF_FFFC));
    }
    asm.op(Op::Retn);
    let (program, l) = load(&asm)?;

    let actions = ActionTable::bundled()?;
    let mut states = StateArena::new(&program);
    let mut engine = PrototypeEngine::new(
        &program,
        &mut states,
        FrameTyper::new(&actions),
        &actions,
        strict(),
    );
    engine.run();
    let reported: Vec<Position> = engine.diagnostics().iter().map(|d| d.position).collect();
    assert_eq!(reported, vec![l["main"]]);

    let main = states.get(l["main"]).expect("main state");
    assert!(main.is_prototyped());
    assert_eq!(main.param_count(), 0);
    Ok(())
}

#[test]
fn truncated_image_is_rejected() -> Result<()> {
    let mut bytes = script_with_globals().to_ncs_bytes()?;
    bytes.truncate(bytes.len() - 3);
    assert!(NcsFile::parse(bytes).is_err());
    Ok(())
}
